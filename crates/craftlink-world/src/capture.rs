use craftlink_protocol::{CaptureCallback, ImageRef, PhotoCapture};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
enum Mode {
    Immediate(Vec<ImageRef>),
    Deferred,
}

/// Photo capture returning canned images.
///
/// `immediate` answers inside the call; `deferred` parks callbacks until
/// [`StaticPhotoCapture::resolve_pending`], mimicking a render-and-readback
/// that completes on a later frame.
pub struct StaticPhotoCapture {
    mode: Mode,
    pending: Mutex<Vec<CaptureCallback>>,
    requests: Mutex<usize>,
}

impl StaticPhotoCapture {
    pub fn immediate(images: Vec<ImageRef>) -> Self {
        Self::with_mode(Mode::Immediate(images))
    }

    /// Four file-name images named after the capture directions.
    pub fn four_views(prefix: &str) -> Self {
        Self::immediate(
            ["front", "back", "left", "right"]
                .iter()
                .map(|side| ImageRef::from_file_name(format!("{prefix}_{side}.png")))
                .collect(),
        )
    }

    pub fn deferred() -> Self {
        Self::with_mode(Mode::Deferred)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            pending: Mutex::new(Vec::new()),
            requests: Mutex::new(0),
        }
    }

    /// Complete every parked capture with `images`.
    pub fn resolve_pending(&self, images: Vec<ImageRef>) -> usize {
        let callbacks = std::mem::take(&mut *self.pending.lock());
        let count = callbacks.len();
        for callback in callbacks {
            callback(images.clone());
        }
        count
    }

    pub fn requests(&self) -> usize {
        *self.requests.lock()
    }
}

impl PhotoCapture for StaticPhotoCapture {
    fn capture_four_directions(&self, on_captured: CaptureCallback) {
        *self.requests.lock() += 1;
        match &self.mode {
            Mode::Immediate(images) => on_captured(images.clone()),
            Mode::Deferred => self.pending.lock().push(on_captured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn deferred_capture_completes_on_resolve() {
        let capture = StaticPhotoCapture::deferred();
        let got = Arc::new(Mutex::new(None));
        let sink = got.clone();
        capture.capture_four_directions(Box::new(move |images| {
            *sink.lock() = Some(images.len());
        }));
        assert!(got.lock().is_none());
        assert_eq!(capture.resolve_pending(vec![ImageRef::from_file_name("a.png")]), 1);
        assert_eq!(*got.lock(), Some(1));
        assert_eq!(capture.requests(), 1);
    }
}
