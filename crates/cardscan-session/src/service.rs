// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Verification service — ties the frame detector, the consistency gate and a
// session store into the capture flow a client drives:
//
//   start -> add_frame* (front) -> add_frame* (back) -> confirm
//                 \_______ restart ______/
//
// Detection runs outside the session's critical section; only the gate step
// and the write of its result happen inside `SessionStore::update`.

use std::sync::Arc;

use cardscan_core::error::{Result, ScanError};
use cardscan_core::human_errors::{CaptureStage, capture_hint};
use cardscan_core::{
    Canonical, ConfirmationConfig, FrameScale, GateConfig, Quad, ScanConfig, SessionId,
    SessionStatus, Side,
};
use cardscan_vision::image::processor::{decode_frame, to_jpeg_bytes};
use cardscan_vision::{CardDetector, extract_portrait, rectify};
use image::RgbImage;
use tracing::{debug, info, instrument, warn};

use crate::gate::{self, GateTransition, GateUpdate};
use crate::store::SessionStore;

/// Compares the card portrait with a live capture of the holder's face.
pub trait FaceMatcher: Send + Sync {
    /// Embedding distance between the two faces; lower is more alike.
    fn distance(&self, portrait: &RgbImage, face: &RgbImage) -> Result<f64>;
}

/// Reads the machine-readable zone from a rectified card back.
pub trait MrzReader: Send + Sync {
    fn read(&self, card_back: &RgbImage) -> Result<Option<String>>;
}

/// Delivers the final decision to the relying party.
pub trait VerdictNotifier: Send + Sync {
    fn notify(&self, verdict: &Verdict) -> Result<()>;
}

/// What the relying party is told once a session is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub session: SessionId,
    pub callback_url: String,
    pub status: SessionStatus,
    pub face_distance: f64,
    pub mrz: Option<String>,
}

/// Result of feeding one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// This frame locked a side.
    pub finished: bool,
    /// The side the frame was applied to.
    pub side: Side,
    /// Consecutive stable frames on that side after this frame.
    pub stable_count: u32,
    /// Detected corners, canonical coordinates. `None` when no card was found.
    pub corners: Option<Quad<Canonical>>,
    /// The detected card warped upright at source resolution.
    pub rectified: Option<RgbImage>,
    pub transition: GateTransition,
    /// Both sides are now locked.
    pub scan_complete: bool,
}

impl FrameOutcome {
    pub fn stage(&self, gate: &GateConfig) -> CaptureStage {
        if self.scan_complete && !self.finished {
            return CaptureStage::Complete;
        }
        match self.transition {
            GateTransition::Skipped => CaptureStage::NoCard { side: self.side },
            GateTransition::Reset => CaptureStage::Moved { side: self.side },
            GateTransition::Locked(_) => CaptureStage::SideCaptured { side: self.side },
            GateTransition::Recorded | GateTransition::Stable { .. } => CaptureStage::Steadying {
                side: self.side,
                stable: self.stable_count,
                required: gate.required_stable_frames,
            },
        }
    }
}

/// Result of a successful confirmation.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub status: SessionStatus,
    pub face_distance: f64,
    pub mrz: Option<String>,
    pub front_jpeg: Vec<u8>,
    pub back_jpeg: Vec<u8>,
}

pub struct ScanService<S: SessionStore> {
    store: S,
    detector: CardDetector,
    gate: GateConfig,
    confirmation: ConfirmationConfig,
    face_matcher: Arc<dyn FaceMatcher>,
    mrz_reader: Option<Arc<dyn MrzReader>>,
    notifier: Arc<dyn VerdictNotifier>,
}

impl<S: SessionStore> ScanService<S> {
    pub fn new(
        store: S,
        config: &ScanConfig,
        face_matcher: Arc<dyn FaceMatcher>,
        notifier: Arc<dyn VerdictNotifier>,
    ) -> Self {
        Self {
            store,
            detector: CardDetector::new(config.detector.clone()),
            gate: config.gate.clone(),
            confirmation: config.confirmation.clone(),
            face_matcher,
            mrz_reader: None,
            notifier,
        }
    }

    pub fn with_mrz_reader(mut self, reader: Arc<dyn MrzReader>) -> Self {
        self.mrz_reader = Some(reader);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One-line capture hint for an outcome.
    pub fn hint(&self, outcome: &FrameOutcome) -> String {
        capture_hint(&outcome.stage(&self.gate))
    }

    /// Open a new verification session.
    #[instrument(skip_all)]
    pub fn start(
        &self,
        callback_url: &str,
        requested_information: Option<&str>,
    ) -> Result<SessionId> {
        if callback_url.trim().is_empty() {
            return Err(ScanError::InvalidRequest("callback URL is required".into()));
        }
        let record = self.store.create(callback_url, requested_information)?;
        info!(id = %record.id, "verification started");
        Ok(record.id)
    }

    #[instrument(skip(self), fields(%id))]
    pub fn cancel(&self, id: SessionId) -> Result<()> {
        self.store.delete(id)?;
        info!("verification cancelled");
        Ok(())
    }

    /// Current status and the information the relying party asked for.
    pub fn status(&self, id: SessionId) -> Result<(SessionStatus, Option<String>)> {
        let record = self.store.get(id)?;
        Ok((record.status, record.requested_information))
    }

    /// Feed one encoded camera frame to the active side.
    #[instrument(skip(self, frame), fields(%id, frame_len = frame.len()))]
    pub fn add_frame(&self, id: SessionId, frame: &[u8]) -> Result<FrameOutcome> {
        if self.store.get(id)?.is_scan_finished() {
            return Err(ScanError::ScanAlreadyFinished(id));
        }

        let image = decode_frame(frame)?;
        let candidate = self.detector.detect(&image)?;
        let observation = candidate.as_ref().map(|c| c.observation());

        let mut applied: Option<(Side, GateUpdate)> = None;
        let committed = self.store.update(id, &mut |record| {
            // Another frame may have finished the scan while this one was detecting.
            let side = record
                .active_side()
                .ok_or(ScanError::ScanAlreadyFinished(id))?;
            let update = gate::advance(record.progress(side), observation.as_ref(), &self.gate);
            *record.progress_mut(side) = update.progress;
            applied = Some((side, update));
            Ok(())
        })?;

        let (side, update) = applied
            .ok_or_else(|| ScanError::Database("session update did not run".into()))?;
        if update.locked() {
            info!(%side, "side locked");
        } else {
            debug!(%side, transition = ?update.transition, "frame applied");
        }

        let (corners, rectified) = match candidate {
            Some(c) => (Some(c.quad), Some(c.rectified)),
            None => (None, None),
        };
        Ok(FrameOutcome {
            finished: update.locked(),
            side,
            stable_count: update.progress.consecutive_stable,
            corners,
            rectified,
            transition: update.transition,
            scan_complete: committed.is_scan_finished(),
        })
    }

    /// Throw away the most recent lock and any partial run.
    ///
    /// Returns the side capture resumes on.
    #[instrument(skip(self), fields(%id))]
    pub fn restart(&self, id: SessionId) -> Result<Side> {
        let mut resumed = Side::Front;
        self.store.update(id, &mut |record| {
            resumed = gate::restart(record);
            Ok(())
        })?;
        info!(side = %resumed, "scan restarted");
        Ok(resumed)
    }

    /// Final step: rectify fresh full-resolution captures of both sides
    /// through the locked corners, match the portrait, store and deliver
    /// the verdict.
    #[instrument(skip_all, fields(%id))]
    pub fn confirm(
        &self,
        id: SessionId,
        front: &[u8],
        back: &[u8],
        face: &[u8],
    ) -> Result<Confirmation> {
        let record = self.store.get(id)?;
        let (Some(front_quad), Some(back_quad)) = (record.front.locked, record.back.locked) else {
            return Err(ScanError::ScanNotFinished(id));
        };

        let front = decode_frame(front)?;
        let back = decode_frame(back)?;
        let face = decode_frame(face)?;

        let front_card = rectify_locked(&front, &front_quad)?;
        let back_card = rectify_locked(&back, &back_quad)?;

        let portrait = extract_portrait(&front_card);
        let face_distance = self.face_matcher.distance(&portrait, &face)?;
        let mrz = match &self.mrz_reader {
            Some(reader) => reader.read(&back_card)?,
            None => None,
        };

        let status = if face_distance > self.confirmation.face_distance_threshold {
            SessionStatus::Denied
        } else {
            SessionStatus::Accepted
        };
        self.store.set_status(id, status)?;
        info!(face_distance, status = status.keyword(), "verification decided");

        let verdict = Verdict {
            session: id,
            callback_url: record.callback_url,
            status,
            face_distance,
            mrz: mrz.clone(),
        };
        // The status is already stored and can be polled, so a failed
        // delivery does not fail the confirmation.
        if let Err(err) = self.notifier.notify(&verdict) {
            warn!(error = %err, "verdict delivery failed");
        }

        let quality = self.confirmation.jpeg_quality;
        Ok(Confirmation {
            status,
            face_distance,
            mrz,
            front_jpeg: to_jpeg_bytes(&front_card, quality)?,
            back_jpeg: to_jpeg_bytes(&back_card, quality)?,
        })
    }
}

/// Scale canonical corners onto `image` and warp it upright.
fn rectify_locked(image: &RgbImage, quad: &Quad<Canonical>) -> Result<RgbImage> {
    let scale = FrameScale::canonical_to(image.width(), image.height());
    rectify(image, &quad.to_source(scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemorySessionStore;
    use cardscan_vision::image::processor::to_png_bytes;
    use image::Rgb;
    use imageproc::drawing::draw_polygon_mut;
    use imageproc::point::Point as PixelPoint;
    use std::sync::Mutex;

    struct FixedDistance(f64);

    impl FaceMatcher for FixedDistance {
        fn distance(&self, _portrait: &RgbImage, _face: &RgbImage) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct FixedMrz;

    impl MrzReader for FixedMrz {
        fn read(&self, _card_back: &RgbImage) -> Result<Option<String>> {
            Ok(Some("IDBGR0000000000".into()))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Verdict>>);

    impl VerdictNotifier for Recorder {
        fn notify(&self, verdict: &Verdict) -> Result<()> {
            self.0.lock().unwrap().push(verdict.clone());
            Ok(())
        }
    }

    struct Unreachable;

    impl VerdictNotifier for Unreachable {
        fn notify(&self, _verdict: &Verdict) -> Result<()> {
            Err(ScanError::Collaborator("connection refused".into()))
        }
    }

    fn card_frame(offset: i32) -> Vec<u8> {
        let mut frame = RgbImage::from_pixel(1280, 800, Rgb([25, 25, 30]));
        let poly = [(200, 160), (1080, 160), (1080, 640), (200, 640)]
            .map(|(x, y)| PixelPoint::new(x + offset, y + offset));
        draw_polygon_mut(&mut frame, &poly, Rgb([235, 230, 220]));
        to_png_bytes(&frame).unwrap()
    }

    fn blank_frame() -> Vec<u8> {
        to_png_bytes(&RgbImage::from_pixel(1280, 800, Rgb([25, 25, 30]))).unwrap()
    }

    fn service(distance: f64, notifier: Arc<dyn VerdictNotifier>) -> ScanService<MemorySessionStore> {
        ScanService::new(
            MemorySessionStore::new(),
            &ScanConfig::default(),
            Arc::new(FixedDistance(distance)),
            notifier,
        )
    }

    /// Feed identical frames until `side` locks; returns how many it took.
    fn lock_side(service: &ScanService<MemorySessionStore>, id: SessionId, side: Side) -> usize {
        let frame = card_frame(0);
        for n in 1..=20 {
            let outcome = service.add_frame(id, &frame).unwrap();
            assert_eq!(outcome.side, side);
            if outcome.finished {
                return n;
            }
        }
        panic!("{side} never locked");
    }

    #[test]
    fn start_requires_callback() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let err = service.start("  ", None).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRequest(_)));
    }

    #[test]
    fn status_reports_requested_information() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service
            .start("https://example.test/cb", Some("name"))
            .unwrap();
        assert_eq!(
            service.status(id).unwrap(),
            (SessionStatus::InProgress, Some("name".to_string()))
        );
    }

    #[test]
    fn steady_card_locks_front_then_back() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();

        // One reference frame, then ten stable comparisons.
        assert_eq!(lock_side(&service, id, Side::Front), 11);
        let record = service.store().get(id).unwrap();
        assert!(record.front.is_locked());
        assert_eq!(record.back, Default::default());

        assert_eq!(lock_side(&service, id, Side::Back), 11);
        assert!(service.store().get(id).unwrap().is_scan_finished());

        let err = service.add_frame(id, &card_frame(0)).unwrap_err();
        assert!(matches!(err, ScanError::ScanAlreadyFinished(_)));
    }

    #[test]
    fn frame_outcome_carries_candidate() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();

        let outcome = service.add_frame(id, &card_frame(0)).unwrap();
        assert!(!outcome.finished);
        assert_eq!(outcome.transition, GateTransition::Recorded);
        assert!(outcome.corners.is_some());
        assert!(outcome.rectified.is_some());
        assert!(service.hint(&outcome).contains("0/10"));
    }

    #[test]
    fn frame_without_card_leaves_progress_alone() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();
        for _ in 0..3 {
            service.add_frame(id, &card_frame(0)).unwrap();
        }
        let before = service.store().get(id).unwrap().front;

        let outcome = service.add_frame(id, &blank_frame()).unwrap();
        assert!(!outcome.finished);
        assert!(outcome.corners.is_none());
        assert_eq!(outcome.transition, GateTransition::Skipped);
        assert_eq!(service.store().get(id).unwrap().front, before);
    }

    #[test]
    fn undecodable_frame_is_rejected() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();
        let err = service.add_frame(id, b"not an image").unwrap_err();
        assert!(matches!(err, ScanError::ImageDecode(_)));
    }

    #[test]
    fn unknown_session_is_not_found() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let err = service.add_frame(SessionId::new(), &card_frame(0)).unwrap_err();
        assert!(matches!(err, ScanError::SessionNotFound(_)));
    }

    #[test]
    fn restart_during_back_starts_over() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();
        lock_side(&service, id, Side::Front);
        service.add_frame(id, &card_frame(0)).unwrap();

        assert_eq!(service.restart(id).unwrap(), Side::Front);
        let record = service.store().get(id).unwrap();
        assert!(!record.front.is_locked());
        assert_eq!(record.active_side(), Some(Side::Front));
    }

    #[test]
    fn confirm_before_scan_finishes_is_rejected() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();
        lock_side(&service, id, Side::Front);
        let frame = card_frame(0);
        let err = service.confirm(id, &frame, &frame, &frame).unwrap_err();
        assert!(matches!(err, ScanError::ScanNotFinished(_)));
    }

    #[test]
    fn close_face_is_accepted_and_delivered() {
        let recorder = Arc::new(Recorder::default());
        let service = service(0.25, recorder.clone()).with_mrz_reader(Arc::new(FixedMrz));
        let id = service.start("https://example.test/cb", None).unwrap();
        lock_side(&service, id, Side::Front);
        lock_side(&service, id, Side::Back);

        let frame = card_frame(0);
        let confirmation = service.confirm(id, &frame, &frame, &blank_frame()).unwrap();

        assert_eq!(confirmation.status, SessionStatus::Accepted);
        assert_eq!(confirmation.mrz.as_deref(), Some("IDBGR0000000000"));
        assert_eq!(&confirmation.front_jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(service.status(id).unwrap().0, SessionStatus::Accepted);

        let delivered = recorder.0.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].callback_url, "https://example.test/cb");
        assert_eq!(delivered[0].status, SessionStatus::Accepted);
    }

    #[test]
    fn threshold_distance_is_still_accepted() {
        let service = service(0.4, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();
        lock_side(&service, id, Side::Front);
        lock_side(&service, id, Side::Back);
        let frame = card_frame(0);
        let confirmation = service.confirm(id, &frame, &frame, &frame).unwrap();
        assert_eq!(confirmation.status, SessionStatus::Accepted);
    }

    #[test]
    fn distant_face_is_denied_even_if_delivery_fails() {
        let service = service(0.9, Arc::new(Unreachable));
        let id = service.start("https://example.test/cb", None).unwrap();
        lock_side(&service, id, Side::Front);
        lock_side(&service, id, Side::Back);

        let frame = card_frame(0);
        let confirmation = service.confirm(id, &frame, &frame, &frame).unwrap();
        assert_eq!(confirmation.status, SessionStatus::Denied);
        assert_eq!(confirmation.mrz, None);
        assert_eq!(service.status(id).unwrap().0, SessionStatus::Denied);
    }

    #[test]
    fn cancel_deletes_session() {
        let service = service(0.1, Arc::new(Recorder::default()));
        let id = service.start("https://example.test/cb", None).unwrap();
        service.cancel(id).unwrap();
        assert!(matches!(
            service.status(id),
            Err(ScanError::SessionNotFound(_))
        ));
    }
}
