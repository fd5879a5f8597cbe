use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::segmentation::{LabeledRegion, SegmentationResult};
use crate::traits::{Notifier, ResultRenderer, SegmentationListener};

/// Work posted onto the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Results(SegmentationResult),
    Error(String),
}

/// Listener that marshals every callback onto the UI loop.
///
/// Cheap to clone and safe to call from any thread. Once the loop is gone,
/// callbacks are dropped silently.
#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiHandle {
    pub fn post(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            debug!("UI loop is gone, dropping event");
        }
    }
}

impl SegmentationListener for UiHandle {
    fn on_results(&self, result: SegmentationResult) {
        self.post(UiEvent::Results(result));
    }

    fn on_error(&self, error: String) {
        self.post(UiEvent::Error(error));
    }
}

/// Sole owner of the renderer and notifier.
pub struct UiLoop<R: ResultRenderer, N: Notifier> {
    renderer: R,
    notifier: N,
    rx: mpsc::UnboundedReceiver<UiEvent>,
}

pub fn ui_channel<R: ResultRenderer, N: Notifier>(
    renderer: R,
    notifier: N,
) -> (UiHandle, UiLoop<R, N>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        UiHandle { tx },
        UiLoop {
            renderer,
            notifier,
            rx,
        },
    )
}

impl<R: ResultRenderer, N: Notifier> UiLoop<R, N> {
    /// Processes events until every handle is dropped or `token` is cancelled.
    ///
    /// Hands the renderer and notifier back when done.
    pub async fn run(mut self, token: CancellationToken) -> (R, N) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }
        (self.renderer, self.notifier)
    }

    fn dispatch(&mut self, event: UiEvent) {
        match event {
            UiEvent::Results(result) => {
                self.renderer.set_results(
                    &result.regions,
                    result.image_height,
                    result.image_width,
                );
                self.renderer.invalidate();
            }
            UiEvent::Error(message) => self.notifier.notify(&message),
        }
    }
}

/// Prints a short per-frame summary on redraw.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    summary: Option<String>,
    frames: usize,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl ResultRenderer for ConsoleRenderer {
    fn set_results(&mut self, regions: &[LabeledRegion], image_height: u32, image_width: u32) {
        let total = (image_height as usize * image_width as usize).max(1);
        let mut lines = vec![format!(
            "{} region(s) on {}x{}",
            regions.len(),
            image_width,
            image_height
        )];
        for region in regions {
            let [r, g, b, _] = region.label.color.0;
            lines.push(format!(
                "  {:<14} #{:02x}{:02x}{:02x} {:>6.2}%",
                region.label.display_name,
                r,
                g,
                b,
                region.area() as f64 * 100.0 / total as f64
            ));
        }
        self.summary = Some(lines.join("\n"));
    }

    fn invalidate(&mut self) {
        if let Some(summary) = &self.summary {
            self.frames += 1;
            println!("{summary}");
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }
}
