use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::camera::Camera;
use crate::error::Result;
use crate::frame::ENCODER_FORMAT;
use crate::inference::Annotator;
use crate::store::FrameStore;

pub struct CaptureLoop<C: Camera> {
    camera: C,
    annotator: Option<Box<dyn Annotator>>,
    store: FrameStore,
    interval: Duration,
    frames: u64,
}

impl<C: Camera> CaptureLoop<C> {
    pub fn new(camera: C, store: FrameStore, interval: Duration) -> Self {
        CaptureLoop {
            camera,
            annotator: None,
            store,
            interval,
            frames: 0,
        }
    }

    pub fn with_annotator(mut self, annotator: Option<Box<dyn Annotator>>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn step(&mut self) -> Result<()> {
        let mut frame = self.camera.capture()?;
        if let Some(annotator) = self.annotator.as_mut() {
            frame = annotator.annotate(frame)?;
        }

        self.camera.synchronize()?;
        if let Some(annotator) = self.annotator.as_mut() {
            annotator.synchronize()?;
        }

        self.store.publish(frame.convert(ENCODER_FORMAT));
        self.frames += 1;
        if self.frames % 300 == 0 {
            debug!(frames = self.frames, "capture progress");
        }
        Ok(())
    }

    /// Loops until the camera or network fails. There is no retry.
    pub fn run(mut self) -> Result<()> {
        loop {
            self.step()?;
            thread::sleep(self.interval);
        }
    }
}

impl<C: Camera + 'static> CaptureLoop<C> {
    // A fault ends the thread; the store keeps the last frame.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                info!("capture started");
                if let Err(err) = self.run() {
                    error!("Capture stopped: {err}");
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::frame::{Frame, PixelFormat};

    /// Yields `remaining` RGBA frames filled with an increasing value, then fails.
    struct FakeCamera {
        remaining: u8,
        fill: u8,
    }

    impl Camera for FakeCamera {
        fn capture(&mut self) -> Result<Frame> {
            if self.remaining == 0 {
                return Err(Error::Camera("unplugged".into()));
            }
            self.remaining -= 1;
            self.fill += 1;
            Frame::new(2, 1, PixelFormat::Rgba, vec![self.fill, 0, 0, 255, self.fill, 0, 0, 255])
        }
    }

    /// Paints the green channel and counts synchronizations.
    struct Marker {
        syncs: Arc<AtomicUsize>,
    }

    impl Annotator for Marker {
        fn annotate(&mut self, frame: Frame) -> Result<Frame> {
            let mut data = frame.data.to_vec();
            for px in data.chunks_exact_mut(4) {
                px[1] = 200;
            }
            Frame::new(frame.width, frame.height, frame.format, data)
        }

        fn synchronize(&mut self) -> Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn step_publishes_converted_frame() {
        let store = FrameStore::new();
        let mut capture = CaptureLoop::new(
            FakeCamera { remaining: 1, fill: 0 },
            store.clone(),
            Duration::ZERO,
        );
        assert_eq!(store.snapshot(), None);
        capture.step().unwrap();

        let frame = store.snapshot().unwrap();
        assert_eq!(frame.format, ENCODER_FORMAT);
        assert_eq!(frame, Frame::new(2, 1, PixelFormat::Rgba, vec![1, 0, 0, 255, 1, 0, 0, 255]).unwrap().convert(ENCODER_FORMAT));
    }

    #[test]
    fn annotator_runs_before_publish() {
        let store = FrameStore::new();
        let syncs = Arc::new(AtomicUsize::new(0));
        let mut capture = CaptureLoop::new(
            FakeCamera { remaining: 2, fill: 0 },
            store.clone(),
            Duration::ZERO,
        )
        .with_annotator(Some(Box::new(Marker { syncs: syncs.clone() })));

        capture.step().unwrap();
        capture.step().unwrap();
        let frame = store.snapshot().unwrap().convert(PixelFormat::Rgb);
        assert_eq!(&frame.data[..], &[2, 200, 0, 2, 200, 0]);
        assert_eq!(syncs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn camera_fault_ends_loop_and_keeps_last_frame() {
        let store = FrameStore::new();
        let capture = CaptureLoop::new(
            FakeCamera { remaining: 3, fill: 0 },
            store.clone(),
            Duration::from_millis(1),
        );
        assert!(matches!(capture.run(), Err(Error::Camera(_))));
        assert_eq!(store.snapshot().unwrap().data[0], 3);
    }

    #[test]
    fn spawned_loop_publishes() {
        let store = FrameStore::new();
        CaptureLoop::new(FakeCamera { remaining: 5, fill: 0 }, store.clone(), Duration::ZERO)
            .spawn()
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(store.snapshot().unwrap().data[0], 5);
    }
}
