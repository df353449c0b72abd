//! Operator-paced control loop: each input line runs one publish cycle,
//! a shutdown signal ends the loop.

use crate::publisher::Publisher;
use std::future::Future;
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::warn;

/// Why the controller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerExit {
    /// Shutdown arrived while idle
    Signalled,
    /// Shutdown arrived mid-cycle; the cycle was dropped before the pointer swap
    AbandonedPublish,
    /// Operator input ended first, then shutdown arrived
    InputClosed,
}

/// Run publish cycles on each trigger until `shutdown` resolves.
pub async fn run_controller<F>(
    publisher: &Publisher,
    mut triggers: mpsc::Receiver<()>,
    shutdown: F,
) -> ControllerExit
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return ControllerExit::Signalled,
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    warn!("Operator input closed, waiting for shutdown signal");
                    shutdown.await;
                    return ControllerExit::InputClosed;
                }

                println!("\nUploading video: {}", publisher.source_file().display());

                tokio::select! {
                    _ = &mut shutdown => {
                        warn!("Shutdown requested during publish, abandoning cycle");
                        return ControllerExit::AbandonedPublish;
                    }
                    result = publisher.publish() => match result {
                        Ok(published) => {
                            println!(
                                "Successfully uploaded {} (size: {} bytes)",
                                published.object.key, published.object.size_bytes
                            );
                            println!("Video is now available at: {}", published.public_url);
                            println!(
                                "\nPress Enter to upload {} again, or Ctrl+C to exit...",
                                publisher.source_file().display()
                            );
                        }
                        Err(e) => {
                            println!("{e}");
                            println!("Press Enter to try again, or Ctrl+C to exit...");
                        }
                    },
                }
            }
        }
    }
}

/// Read operator input on a dedicated thread, one trigger per line. The
/// thread is never joined; process exit reclaims it.
pub fn spawn_operator_input() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() || tx.blocking_send(()).is_err() {
                break;
            }
        }
    });

    rx
}
