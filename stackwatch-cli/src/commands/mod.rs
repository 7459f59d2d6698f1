pub mod logs;
pub mod start;
pub mod status;
pub mod stop;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn print_ok(message: impl std::fmt::Display) {
    println!("  {GREEN}✓{RESET} {message}");
}

fn print_fail(message: impl std::fmt::Display) {
    println!("  {RED}✗{RESET} {message}");
}

fn print_warn(message: impl std::fmt::Display) {
    println!("  {YELLOW}⚠{RESET} {message}");
}

fn print_hint(message: impl std::fmt::Display) {
    println!("    └─ {message}");
}
