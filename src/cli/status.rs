use std::io::Write;

use crate::supervisor::ServerStatus;

pub fn render<W: Write>(status: &ServerStatus, port: u16, out: &mut W) -> std::io::Result<()> {
    let server = match (status.pid, status.pid_alive) {
        (Some(pid), true) => format!("running (pid {pid})"),
        (Some(pid), false) => format!("pid {pid} recorded but not running (stale)"),
        (None, _) => "not started by laisis".to_string(),
    };

    writeln!(out, "Server:        {server}")?;
    writeln!(
        out,
        "Port {port:<6}   {}",
        if status.listening { "listening ✓" } else { "no listener" }
    )?;
    writeln!(
        out,
        "Active model:  {}",
        status.active_model.as_deref().unwrap_or("none")
    )?;

    if status.pid.is_some() && !status.pid_alive {
        writeln!(out)?;
        writeln!(out, "💡 Clear the stale record: stop ollama")?;
    } else if !status.listening {
        writeln!(out)?;
        writeln!(out, "💡 Start the server: start ollama")?;
    }

    Ok(())
}
