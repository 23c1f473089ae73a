//! Print the status codes an override can use

use console::style;
use whdbg_common::status::{DEFAULT_STATUS_CODE, STATUS_CODES};

pub fn run() {
    for (code, label) in STATUS_CODES {
        let styled = match *code {
            500.. => style(*label).red(),
            400.. => style(*label).yellow(),
            300.. => style(*label).cyan(),
            _ => style(*label).green(),
        };

        if *code == DEFAULT_STATUS_CODE {
            println!("  {}  {}", styled.bold(), style("(default)").dim());
        } else {
            println!("  {}", styled);
        }
    }

    println!();
    println!(
        "{}",
        style(format!(
            "{} codes. Use `whdbg listen <LISTENER> --status <CODE>` to pick one.",
            STATUS_CODES.len()
        ))
        .dim()
    );
}
