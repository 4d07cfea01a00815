use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_impl::{ActuatorController, ControlLoop, Debouncer};
use common::{ActuatorStatus, ControlLoopConfig, SimulatedLight};
use proptest::prelude::*;
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_millis(500);
const ON_DELAY: Duration = Duration::from_millis(200);
const OFF_DELAY: Duration = Duration::from_millis(1000);
const EPSILON: Duration = Duration::from_millis(1);

fn recording_debouncer(window: Duration) -> (Debouncer, Arc<Mutex<Vec<bool>>>) {
    let debouncer = Debouncer::new(window);
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    debouncer.set_sink(move |v| sink.lock().unwrap().push(v));
    (debouncer, published)
}

fn controller() -> (Arc<SimulatedLight>, ActuatorController) {
    let light = Arc::new(SimulatedLight::new());
    let controller = ActuatorController::new(light.clone(), ON_DELAY, OFF_DELAY);
    (light, controller)
}

#[tokio::test(start_paused = true)]
async fn flicker_faster_than_window_publishes_once() {
    let (debouncer, published) = recording_debouncer(WINDOW);

    for v in [true, false, true, false, true] {
        debouncer.observe(v);
        sleep(Duration::from_millis(100)).await;
    }
    sleep(WINDOW * 4).await;

    assert_eq!(*published.lock().unwrap(), vec![true]);
    assert!(debouncer.stable());
}

#[tokio::test(start_paused = true)]
async fn events_further_apart_than_window_both_publish() {
    let (debouncer, published) = recording_debouncer(WINDOW);

    debouncer.observe(true);
    sleep(WINDOW + EPSILON).await;
    debouncer.observe(false);
    sleep(WINDOW + EPSILON).await;

    assert_eq!(*published.lock().unwrap(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn activation_wins_over_late_deactivation() {
    let (light, controller) = controller();

    controller.request_deactivation();
    sleep(OFF_DELAY / 2).await;
    controller.request_activation();
    sleep(ON_DELAY + OFF_DELAY).await;

    assert_eq!(light.disable_calls(), 0);
    assert_eq!(light.enable_calls(), 1);
    assert_eq!(controller.current_status(), ActuatorStatus::On);
}

#[tokio::test(start_paused = true)]
async fn repeated_activation_fires_once_from_last_request() {
    let (light, controller) = controller();

    controller.request_activation();
    sleep(Duration::from_millis(100)).await;
    controller.request_activation();

    // 200ms after the first request, 100ms after the second
    sleep(Duration::from_millis(100)).await;
    assert_eq!(light.enable_calls(), 0);

    sleep(Duration::from_millis(100) + EPSILON).await;
    assert_eq!(light.enable_calls(), 1);

    sleep(OFF_DELAY).await;
    assert_eq!(light.enable_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn immediate_double_activation_enables_once() {
    let (light, controller) = controller();

    controller.request_activation();
    controller.request_activation();
    sleep(ON_DELAY * 5).await;

    assert_eq!(light.enable_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn fault_surfaces_as_error_and_loop_keeps_working() {
    let (light, controller) = controller();
    light.fail_next();

    controller.request_activation();
    sleep(ON_DELAY + EPSILON).await;
    assert_eq!(controller.current_status(), ActuatorStatus::Error);

    controller.request_deactivation();
    sleep(OFF_DELAY - EPSILON).await;
    assert_eq!(light.disable_calls(), 0);
    sleep(EPSILON * 2).await;
    assert_eq!(light.disable_calls(), 1);
    assert_eq!(controller.current_status(), ActuatorStatus::Off);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_transition() {
    let (light, controller) = controller();

    controller.request_activation();
    sleep(ON_DELAY / 2).await;
    controller.shutdown();
    sleep(ON_DELAY * 10).await;

    assert_eq!(light.enable_calls(), 0);
    assert_eq!(light.disable_calls(), 0);

    // requests after shutdown are inert too
    controller.request_deactivation();
    sleep(OFF_DELAY * 2).await;
    assert_eq!(light.disable_calls(), 0);
    assert_eq!(controller.current_status(), ActuatorStatus::Off);
}

#[tokio::test(start_paused = true)]
async fn effects_follow_expiry_order_not_request_order() {
    let (light, controller) = controller();
    let mut status = controller.subscribe();

    controller.request_deactivation();
    controller.request_activation();
    status.changed().await.unwrap();
    assert_eq!(*status.borrow_and_update(), ActuatorStatus::On);

    controller.request_deactivation();
    status.changed().await.unwrap();
    assert_eq!(*status.borrow_and_update(), ActuatorStatus::Off);

    assert_eq!(light.enable_calls(), 1);
    assert_eq!(light.disable_calls(), 1);
}

#[test]
fn concurrent_requests_from_many_threads_leave_one_effect() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();
    let light = Arc::new(SimulatedLight::new());
    let controller = {
        let _guard = runtime.enter();
        Arc::new(ActuatorController::new(
            light.clone(),
            Duration::from_millis(500),
            Duration::from_millis(500),
        ))
    };

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let controller = Arc::clone(&controller);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    if i % 2 == 0 {
                        controller.request_activation();
                    } else {
                        controller.request_deactivation();
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    std::thread::sleep(Duration::from_millis(1500));
    assert_eq!(light.enable_calls() + light.disable_calls(), 1);
    runtime.shutdown_background();
}

#[test]
fn disable_racing_publishes_and_firings_leaves_light_off() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();
    let config = ControlLoopConfig {
        debounce_window_ms: 1,
        activation_delay_ms: 1,
        deactivation_delay_ms: 2,
        ..ControlLoopConfig::default()
    };

    for _ in 0..30 {
        let light = Arc::new(SimulatedLight::new());
        let control = {
            let _guard = runtime.enter();
            Arc::new(ControlLoop::new(&config, light.clone()))
        };
        control.enable();

        let feeder = {
            let control = Arc::clone(&control);
            std::thread::spawn(move || {
                for i in 0..2000u32 {
                    control.on_raw_detection(i % 3 != 0);
                    if i % 100 == 0 {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        };
        for _ in 0..20 {
            control.toggle();
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(control.disable(), ActuatorStatus::Off);
        let enables = light.enable_calls();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(light.enable_calls(), enables);
        assert!(!light.is_lit());
        assert_eq!(control.state().actuator_status, ActuatorStatus::Off);

        feeder.join().unwrap();
        control.shutdown();
    }
    runtime.shutdown_background();
}

proptest! {
    #[test]
    fn any_burst_inside_window_collapses_to_last_value(
        events in prop::collection::vec((any::<bool>(), 0u64..100), 1..30)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let published = runtime.block_on(async {
            let (debouncer, published) = recording_debouncer(Duration::from_millis(100));
            for (value, gap_ms) in &events {
                debouncer.observe(*value);
                sleep(Duration::from_millis(*gap_ms)).await;
            }
            sleep(Duration::from_millis(500)).await;
            let result = published.lock().unwrap().clone();
            result
        });

        let last = events.last().map(|(v, _)| *v).unwrap();
        prop_assert_eq!(published, vec![last]);
    }
}
