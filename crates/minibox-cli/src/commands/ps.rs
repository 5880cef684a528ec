//! `minibox ps`: list containers.

use minibox_runtime::engine::Engine;

use crate::output::format_table;

/// Executes the `ps` command.
///
/// Lists every record, stopped and exited ones included.
///
/// # Errors
///
/// Returns an error if the containers directory cannot be read.
pub fn execute(engine: &Engine) -> anyhow::Result<()> {
    let rows: Vec<[String; 6]> = engine
        .list()?
        .into_iter()
        .map(|c| {
            [
                c.id.to_string(),
                c.name,
                c.pid,
                c.status.to_string(),
                c.command,
                c.created_time,
            ]
        })
        .collect();

    print!(
        "{}",
        format_table(["ID", "NAME", "PID", "STATUS", "COMMAND", "CREATED"], &rows)
    );
    Ok(())
}
