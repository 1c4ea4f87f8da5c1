// Coloured operator messages printed alongside the mirrored crawler output.
pub const RED: &str = "\x1b[91m";
pub const NC: &str = "\x1b[0m";

/// Wrap a message in red for the console.
pub fn red(message: &str) -> String {
    format!("{RED}{message}{NC}")
}

pub fn print_error(message: &str) {
    println!("{}", red(&format!("ERROR: {message}")));
}

pub fn print_warning(message: &str) {
    println!("{}", red(&format!("WARNING: {message}")));
}
