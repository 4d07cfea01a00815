use std::io::{self, Write};

pub fn show_menu() -> io::Result<()> {
    println!("\n===========================================");
    println!("Presence Light Control Loop");
    println!("===========================================");
    println!("Select an option:");
    println!("1. Threaded Implementation Demo");
    println!("2. Async Implementation Demo");
    println!("3. Compare Implementations");
    println!("4. Manual Control");
    println!("5. Exit");
    println!("===========================================");
    print!("Choice (1-5): ");
    io::stdout().flush()
}

pub fn get_user_choice() -> io::Result<Option<u32>> {
    let input = read_line()?;
    Ok(input.trim().parse::<u32>().ok())
}

pub fn show_manual_help() {
    println!("\nCommands:");
    println!("  p  raw detection: person present");
    println!("  a  raw detection: person absent");
    println!("  f  flicker burst (present/absent x5, ending present)");
    println!("  t  toggle the control loop");
    println!("  s  show state");
    println!("  q  back to menu");
}

pub fn prompt(label: &str) -> io::Result<String> {
    print!("{label}> ");
    io::stdout().flush()?;
    read_line()
}

pub fn wait_for_enter() -> io::Result<()> {
    println!("\nPress Enter to return to menu...");
    read_line().map(|_| ())
}

fn read_line() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}
