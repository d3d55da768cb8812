use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Merge a child's stdout and stderr into one line stream, in arrival order.
///
/// The receiver ends once both pipes close. Takes the pipe handles out of
/// `child`; the caller keeps the child for `wait`/`kill`.
pub(crate) fn merged_lines(child: &mut Child) -> UnboundedReceiver<String> {
    let (tx, rx) = unbounded_channel::<String>();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(line);
            }
        });
    }

    drop(tx); // rx finishes when both reader tasks finish
    rx
}
