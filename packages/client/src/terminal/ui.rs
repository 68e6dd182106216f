//! UI utilities for the terminal front-end.

use std::io::Write;

/// Prompt shown while a session view is mounted.
pub fn prompt(session_id: &str) -> String {
    format!("{}> ", session_id)
}

/// Print output that arrived asynchronously and redisplay the prompt
pub fn print_above_prompt(text: &str, session_id: &str) {
    if text.is_empty() {
        return;
    }
    print!("{}{}", text, prompt(session_id));
    std::io::stdout().flush().ok();
}
