//! Per-frame tag analysis: find, undistort, estimate, publish, draw.
//!

use std::sync::Arc;

use image::GrayImage;
use ndarray::ArrayView2;

use super::lens::LensModel;
use super::pose::{HomographyPoseEstimator, PoseEstimator};
use super::{Blip, Detection, DetectorConfig, Pose, TagFinder};
use crate::module::camera::{Camera, Request, Size};
use crate::module::define;
use crate::module::display::Display;
use crate::module::error::{Error, Result};
use crate::module::identity::Identity;
use crate::module::network::{BlipSink, Network};
use crate::module::util::conf::Config;

/// Topic path for one camera's blips.
pub fn path(identity: Identity, camera_num: u32) -> String {
    format!(
        "{}/{}/{}/{}",
        define::network::ROOT,
        identity.key(),
        camera_num,
        define::network::BLIPS
    )
}

/// Turns camera frames into published tag poses.
///
pub struct TagDetector<F: TagFinder, E: PoseEstimator = HomographyPoseEstimator> {
    size: Size,
    lens: LensModel,
    finder: F,
    estimator: E,
    sender: Box<dyn BlipSink>,
    display: Arc<dyn Display>,
}

impl<F: TagFinder> TagDetector<F> {
    /// Creates a detector for one camera.
    ///
    /// # Arguments
    ///
    /// * `identity` - This unit, picks the tag size and the topic path.
    /// * `cam` - Source of the frame size and calibration.
    /// * `camera_num` - Index of the camera on this unit.
    /// * `finder` - Tag decoder, configured here once.
    /// * `conf` - Application configuration.
    /// * `network` - Blip transport, opens this camera's topic.
    /// * `display` - Overlay sink.
    ///
    pub fn new(
        identity: Identity,
        cam: &dyn Camera,
        camera_num: u32,
        finder: F,
        conf: &Config,
        network: Arc<dyn Network>,
        display: Arc<dyn Display>,
    ) -> Result<Self> {
        let estimator = HomographyPoseEstimator::new(
            conf.tag_size_for(identity),
            cam.config().lens.intrinsics,
        );
        Self::with_estimator(
            identity, cam, camera_num, finder, estimator, conf, network, display,
        )
    }
}

impl<F: TagFinder, E: PoseEstimator> TagDetector<F, E> {
    /// Same as [`TagDetector::new`] with a caller-supplied pose estimator.
    #[allow(clippy::too_many_arguments)]
    pub fn with_estimator(
        identity: Identity,
        cam: &dyn Camera,
        camera_num: u32,
        mut finder: F,
        estimator: E,
        conf: &Config,
        network: Arc<dyn Network>,
        display: Arc<dyn Display>,
    ) -> Result<Self> {
        finder.configure(&DetectorConfig::from(&conf.detector))?;
        let topic = path(identity, camera_num);
        let sender = network.blip_sender(&topic)?;
        log::info!(
            "Tag detector for {} camera {} publishing on {}",
            identity,
            camera_num,
            topic
        );
        Ok(Self {
            size: cam.size(),
            lens: cam.config().lens,
            finder,
            estimator,
            sender,
            display,
        })
    }

    /// Analyzes one frame and publishes what it sees.
    ///
    /// The overlay is only built once the frame's blips have been flushed.
    /// The request, and with it the frame buffer, is released when this returns.
    pub fn analyze(&mut self, req: Box<dyn Request>) -> Result<()> {
        let delay_us = req.delay_us();
        let detections = match self.luma(req.yuv()) {
            Some(luma) => self.finder.detect(luma)?,
            None => {
                log::debug!(
                    "Frame of {} bytes is short of {}x{} luma",
                    req.yuv().len(),
                    self.size.width,
                    self.size.height
                );
                Vec::new()
            }
        };

        let mut blips = Vec::with_capacity(detections.len());
        let mut seen: Vec<(Detection, Pose)> = Vec::with_capacity(detections.len());
        for detection in detections {
            if detection.hamming > 0 {
                continue;
            }
            let corners = self.lens.undistort_points(&detection.corners);
            let pose = self
                .estimator
                .estimate(&detection.homography, &corners)
                .map_err(|reason| Error::Pose {
                    id: detection.id,
                    reason,
                })?;
            blips.push(Blip {
                id: detection.id,
                pose,
            });
            seen.push((detection, pose));
        }

        // one send per frame, pushed out right away
        self.sender.send(blips, delay_us)?;
        self.sender.flush()?;

        if !self.display.enabled() {
            return Ok(());
        }
        let Some(mut image) = self.luma(req.yuv()).and_then(|luma| self.overlay_image(luma))
        else {
            return Ok(());
        };
        for (detection, pose) in &seen {
            self.display.tag(&mut image, detection, pose);
        }
        self.display
            .text(&mut image, &format!("FPS {:2.0}", req.fps()), (5, 65));
        self.display.text(
            &mut image,
            &format!("delay (ms) {:2.0}", delay_us as f64 / 1000.0),
            (5, 105),
        );
        self.display.put(image);
        Ok(())
    }

    /// Zero-copy view of the luma plane, `None` for a short buffer.
    fn luma<'a>(&self, buffer: &'a [u8]) -> Option<ArrayView2<'a, u8>> {
        let (width, height) = (self.size.width as usize, self.size.height as usize);
        let plane = buffer.get(..width * height)?;
        ArrayView2::from_shape((height, width), plane).ok()
    }

    fn overlay_image(&self, luma: ArrayView2<'_, u8>) -> Option<GrayImage> {
        let data = match luma.as_slice() {
            Some(slice) => slice.to_vec(),
            None => luma.iter().copied().collect(),
        };
        GrayImage::from_raw(self.size.width, self.size.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::camera::CameraConfig;
    use crate::module::network::{LoopbackNetwork, Publication};
    use crate::module::util::conf::toml;
    use crate::module::vision::lens::CameraIntrinsics;
    use crate::module::vision::pose::TAG_CORNERS;
    use nalgebra::{Matrix3, Rotation3, Vector3};
    use std::sync::mpsc::Receiver;
    use std::sync::Mutex;
    use std::time::Duration;

    const W: u32 = 64;
    const H: u32 = 48;

    struct StillCamera {
        config: CameraConfig,
    }

    impl StillCamera {
        fn new() -> Self {
            Self {
                config: CameraConfig {
                    size: Size {
                        width: W,
                        height: H,
                    },
                    lens: LensModel::pinhole(CameraIntrinsics {
                        fx: 60.0,
                        fy: 60.0,
                        cx: 32.0,
                        cy: 24.0,
                    }),
                },
            }
        }
    }

    impl Camera for StillCamera {
        fn config(&self) -> &CameraConfig {
            &self.config
        }

        fn next_request(&mut self) -> Result<Box<dyn Request>> {
            Ok(Box::new(StillRequest {
                data: vec![10; self.config.size.yuv420_len()],
            }))
        }
    }

    struct StillRequest {
        data: Vec<u8>,
    }

    impl Request for StillRequest {
        fn yuv(&self) -> &[u8] {
            &self.data
        }

        fn capture_delay(&self) -> Duration {
            Duration::from_micros(3200)
        }

        fn fps(&self) -> f64 {
            30.0
        }
    }

    /// Replays canned detections and records the frame shape it was given.
    struct ScriptedFinder {
        detections: Vec<Detection>,
        configured: Option<DetectorConfig>,
        shapes: Arc<Mutex<Vec<(usize, usize)>>>,
        fail: bool,
    }

    impl ScriptedFinder {
        fn new(detections: Vec<Detection>) -> Self {
            Self {
                detections,
                configured: None,
                shapes: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }
        }
    }

    impl TagFinder for ScriptedFinder {
        fn configure(&mut self, config: &DetectorConfig) -> Result<()> {
            self.configured = Some(config.clone());
            Ok(())
        }

        fn detect(&mut self, luma: ArrayView2<'_, u8>) -> Result<Vec<Detection>> {
            self.shapes.lock().unwrap().push(luma.dim());
            if self.fail {
                return Err(Error::Detector("decoder fault".to_owned()));
            }
            Ok(self.detections.clone())
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        tags: Mutex<Vec<u32>>,
        texts: Mutex<Vec<(String, (i32, i32))>>,
        puts: Mutex<usize>,
    }

    impl Display for RecordingDisplay {
        fn tag(&self, _image: &mut GrayImage, detection: &Detection, _pose: &Pose) {
            self.tags.lock().unwrap().push(detection.id);
        }

        fn text(&self, _image: &mut GrayImage, text: &str, origin: (i32, i32)) {
            self.texts.lock().unwrap().push((text.to_owned(), origin));
        }

        fn put(&self, image: GrayImage) {
            assert_eq!(image.dimensions(), (W, H));
            *self.puts.lock().unwrap() += 1;
        }
    }

    /// A detection of a tag squarely in front of the still camera.
    fn detection(id: u32, hamming: u32) -> Detection {
        let k = StillCamera::new().config.lens.intrinsics.matrix();
        let rotation = Rotation3::from_euler_angles(std::f64::consts::PI, 0.0, 0.0);
        let r = rotation.matrix();
        let s = 0.1651 / 2.0;
        let c0: Vector3<f64> = r.column(0) * s;
        let c1: Vector3<f64> = r.column(1) * s;
        let h = k * Matrix3::from_columns(&[c0, c1, Vector3::new(0.0, 0.0, 1.0 + id as f64)]);
        let corners = TAG_CORNERS.map(|[x, y]| {
            let p = h * Vector3::new(x, y, 1.0);
            [p.x / p.z, p.y / p.z]
        });
        Detection {
            id,
            hamming,
            corners,
            homography: h,
        }
    }

    fn setup(
        finder: ScriptedFinder,
        display: Arc<RecordingDisplay>,
    ) -> (
        TagDetector<ScriptedFinder>,
        StillCamera,
        Receiver<Publication>,
    ) {
        let conf = toml::defaults().unwrap();
        let (net, rx) = LoopbackNetwork::new(8, Duration::from_millis(20));
        let cam = StillCamera::new();
        let detector =
            TagDetector::new(Identity::Unknown, &cam, 1, finder, &conf, Arc::new(net), display)
                .unwrap();
        (detector, cam, rx)
    }

    #[test]
    fn path_test() {
        assert_eq!(path(Identity::Unknown, 0), "vision/unknown/0/blips");
        assert_eq!(path(Identity::Dev, 1), "vision/10000000a7c673d9/1/blips");
    }

    #[test]
    fn finder_is_configured_once() {
        let (detector, _cam, _rx) = setup(
            ScriptedFinder::new(vec![]),
            Arc::new(RecordingDisplay::default()),
        );
        let configured = detector.finder.configured.clone().unwrap();
        assert_eq!(configured.family, "tag36h11");
        assert_eq!(configured.threads, 4);
    }

    #[test]
    fn empty_frame_publishes_empty_list() {
        let display = Arc::new(RecordingDisplay::default());
        let (mut detector, mut cam, rx) = setup(ScriptedFinder::new(vec![]), display.clone());

        detector.analyze(cam.next_request().unwrap()).unwrap();

        let p = rx.try_recv().unwrap();
        assert_eq!(p.path, "vision/unknown/1/blips");
        assert!(p.blips.is_empty());
        assert_eq!(p.delay_us, 3200);
        assert!(rx.try_recv().is_err());
        // overlay still goes out, with no tags on it
        assert!(display.tags.lock().unwrap().is_empty());
        assert_eq!(*display.puts.lock().unwrap(), 1);
        let texts = display.texts.lock().unwrap();
        assert_eq!(texts[0], ("FPS 30".to_owned(), (5, 65)));
        assert_eq!(texts[1], ("delay (ms)  3".to_owned(), (5, 105)));
    }

    #[test]
    fn imperfect_detections_are_dropped() {
        let display = Arc::new(RecordingDisplay::default());
        let finder = ScriptedFinder::new(vec![detection(1, 0), detection(2, 1), detection(3, 0)]);
        let (mut detector, mut cam, rx) = setup(finder, display.clone());

        detector.analyze(cam.next_request().unwrap()).unwrap();

        let p = rx.try_recv().unwrap();
        let ids: Vec<u32> = p.blips.iter().map(|b| b.id).collect();
        assert_eq!(ids, [1, 3]);
        assert_eq!(*display.tags.lock().unwrap(), [1, 3]);
        // the pose matches the tag placement
        assert!((p.blips[0].pose.translation.z - 2.0).abs() < 1e-6);
        assert!((p.blips[1].pose.translation.z - 4.0).abs() < 1e-6);
    }

    #[test]
    fn one_publication_per_frame() {
        let finder = ScriptedFinder::new(vec![detection(4, 0)]);
        let (mut detector, mut cam, rx) =
            setup(finder, Arc::new(RecordingDisplay::default()));
        for _ in 0..3 {
            detector.analyze(cam.next_request().unwrap()).unwrap();
        }
        let got: Vec<Publication> = rx.try_iter().collect();
        assert_eq!(got.len(), 3);
        assert!(got.iter().all(|p| p.blips.len() == 1));
    }

    #[test]
    fn luma_view_has_frame_shape() {
        let finder = ScriptedFinder::new(vec![]);
        let shapes = finder.shapes.clone();
        let (mut detector, mut cam, _rx) = setup(finder, Arc::new(RecordingDisplay::default()));
        detector.analyze(cam.next_request().unwrap()).unwrap();
        assert_eq!(*shapes.lock().unwrap(), [(H as usize, W as usize)]);
    }

    #[test]
    fn short_buffer_is_zero_detections() {
        let display = Arc::new(RecordingDisplay::default());
        let finder = ScriptedFinder::new(vec![detection(1, 0)]);
        let shapes = finder.shapes.clone();
        let (mut detector, _cam, rx) = setup(finder, display.clone());

        let req = Box::new(StillRequest { data: vec![0; 10] });
        detector.analyze(req).unwrap();

        assert!(shapes.lock().unwrap().is_empty());
        assert!(rx.try_recv().unwrap().blips.is_empty());
        assert_eq!(*display.puts.lock().unwrap(), 0);
    }

    #[test]
    fn finder_fault_drops_the_frame() {
        let mut finder = ScriptedFinder::new(vec![]);
        finder.fail = true;
        let (mut detector, mut cam, rx) =
            setup(finder, Arc::new(RecordingDisplay::default()));
        let err = detector.analyze(cam.next_request().unwrap()).unwrap_err();
        assert!(err.is_frame_fault());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pose_fault_names_the_tag() {
        struct Failing;
        impl PoseEstimator for Failing {
            fn estimate(
                &self,
                _homography: &Matrix3<f64>,
                _corners: &[crate::module::vision::Point; 4],
            ) -> std::result::Result<Pose, String> {
                Err("singular".to_owned())
            }
        }

        let conf = toml::defaults().unwrap();
        let (net, rx) = LoopbackNetwork::new(8, Duration::from_millis(20));
        let mut cam = StillCamera::new();
        let mut detector = TagDetector::with_estimator(
            Identity::Unknown,
            &cam,
            0,
            ScriptedFinder::new(vec![detection(9, 0)]),
            Failing,
            &conf,
            Arc::new(net),
            Arc::new(RecordingDisplay::default()),
        )
        .unwrap();
        let err = detector.analyze(cam.next_request().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Pose { id: 9, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stalled_network_is_reported() {
        let conf = toml::defaults().unwrap();
        let (net, _rx) = LoopbackNetwork::new(1, Duration::from_millis(2));
        let mut cam = StillCamera::new();
        let mut detector = TagDetector::new(
            Identity::Unknown,
            &cam,
            0,
            ScriptedFinder::new(vec![]),
            &conf,
            Arc::new(net),
            Arc::new(RecordingDisplay::default()),
        )
        .unwrap();
        detector.analyze(cam.next_request().unwrap()).unwrap();
        let err = detector.analyze(cam.next_request().unwrap()).unwrap_err();
        assert!(matches!(err, Error::FlushTimeout(_)));
        assert!(!err.is_frame_fault());
    }

    /// Counts calls and keeps every sent frame.
    #[derive(Default)]
    struct CountingNetwork {
        sent: Arc<Mutex<Vec<(Vec<Blip>, u64)>>>,
        flushes: Arc<Mutex<usize>>,
    }

    struct CountingSink {
        sent: Arc<Mutex<Vec<(Vec<Blip>, u64)>>>,
        flushes: Arc<Mutex<usize>>,
    }

    impl BlipSink for CountingSink {
        fn send(&self, blips: Vec<Blip>, delay_us: u64) -> Result<()> {
            self.sent.lock().unwrap().push((blips, delay_us));
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    impl Network for CountingNetwork {
        fn blip_sender(&self, _path: &str) -> Result<Box<dyn BlipSink>> {
            Ok(Box::new(CountingSink {
                sent: self.sent.clone(),
                flushes: self.flushes.clone(),
            }))
        }

        fn flush(&self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Network and display that log every call into one shared list.
    #[derive(Clone, Default)]
    struct EventLog(Arc<Mutex<Vec<&'static str>>>);

    impl EventLog {
        fn push(&self, event: &'static str) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl Network for EventLog {
        fn blip_sender(&self, _path: &str) -> Result<Box<dyn BlipSink>> {
            Ok(Box::new(self.clone()))
        }

        fn flush(&self) -> Result<()> {
            self.push("network flush");
            Ok(())
        }
    }

    impl BlipSink for EventLog {
        fn send(&self, _blips: Vec<Blip>, _delay_us: u64) -> Result<()> {
            self.push("send");
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            self.push("flush");
            Ok(())
        }
    }

    impl Display for EventLog {
        fn enabled(&self) -> bool {
            self.push("enabled");
            true
        }

        fn tag(&self, _image: &mut GrayImage, _detection: &Detection, _pose: &Pose) {
            self.push("tag");
        }

        fn text(&self, _image: &mut GrayImage, _text: &str, _origin: (i32, i32)) {
            self.push("text");
        }

        fn put(&self, _image: GrayImage) {
            self.push("put");
        }
    }

    #[test]
    fn overlay_waits_for_the_flush() {
        let conf = toml::defaults().unwrap();
        let events = EventLog::default();
        let mut cam = StillCamera::new();
        let mut detector = TagDetector::new(
            Identity::Unknown,
            &cam,
            0,
            ScriptedFinder::new(vec![detection(2, 0)]),
            &conf,
            Arc::new(events.clone()),
            Arc::new(events.clone()),
        )
        .unwrap();
        detector.analyze(cam.next_request().unwrap()).unwrap();
        assert_eq!(
            *events.0.lock().unwrap(),
            ["send", "flush", "enabled", "tag", "text", "text", "put"]
        );
    }

    #[test]
    fn single_tag_through_distorted_lens() {
        use crate::module::vision::lens::RadialTangentialDistortion;

        let mut cam = StillCamera::new();
        cam.config.lens.distortion = RadialTangentialDistortion {
            k1: -0.3,
            k2: 0.1,
            p1: 0.001,
            p2: 0.0,
            k3: 0.0,
        };
        let lens = cam.config.lens;
        // what the sensor sees: ideal corners pushed through the lens
        let mut seen = detection(7, 0);
        seen.corners = seen.corners.map(|p| lens.distort_pixel(p).unwrap());

        let conf = toml::defaults().unwrap();
        let network = Arc::new(CountingNetwork::default());
        let mut detector = TagDetector::new(
            Identity::Unknown,
            &cam,
            0,
            ScriptedFinder::new(vec![seen.clone()]),
            &conf,
            network.clone(),
            Arc::new(RecordingDisplay::default()),
        )
        .unwrap();
        detector.analyze(cam.next_request().unwrap()).unwrap();

        let sent = network.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(*network.flushes.lock().unwrap(), 1);
        let (blips, delay_us) = &sent[0];
        assert_eq!(*delay_us, 3200);
        assert_eq!(blips.len(), 1);
        assert_eq!(blips[0].id, 7);

        let expected = HomographyPoseEstimator::new(0.1651, lens.intrinsics)
            .estimate(&seen.homography, &lens.undistort_points(&seen.corners))
            .unwrap();
        assert_eq!(blips[0].pose, expected);
        // and that is the tag where it was placed
        assert!((expected.translation - Vector3::new(0.0, 0.0, 8.0)).norm() < 1e-6);
    }
}
