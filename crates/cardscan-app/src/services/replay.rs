// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Headless replay — drives one verification session from a directory of
// recorded camera frames, the way the capture screen would drive it live.

use std::path::{Path, PathBuf};

use cardscan_core::error::{Result, ScanError};
use cardscan_core::human_errors::humanize_error;
use cardscan_core::{SessionId, SessionStatus, Side};
use cardscan_session::{ScanService, SessionStore};
use cardscan_vision::image::to_jpeg_bytes;
use tracing::{debug, info, instrument, warn};

/// Frame file extensions picked up from a directory.
const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Quality of the per-side preview written when a side locks.
const PREVIEW_QUALITY: u8 = 90;

/// Fresh full-resolution captures handed to confirmation.
#[derive(Debug, Clone)]
pub struct ConfirmInputs {
    pub front: PathBuf,
    pub back: PathBuf,
    pub face: PathBuf,
}

/// What one replay run did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub session: SessionId,
    pub frames_read: usize,
    pub frames_rejected: usize,
    pub locked: Vec<Side>,
    pub status: SessionStatus,
}

/// List frame files in `dir`, sorted by name.
pub fn frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_frame && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// Feed `frames` into a new session until both sides lock, writing a
/// preview of each locked side into `out_dir`. Runs confirmation afterwards
/// when `confirm` is given.
#[instrument(skip_all, fields(frames = frames.len(), out = %out_dir.display()))]
pub fn replay<S: SessionStore>(
    service: &ScanService<S>,
    frames: &[PathBuf],
    out_dir: &Path,
    confirm: Option<&ConfirmInputs>,
) -> Result<ReplaySummary> {
    std::fs::create_dir_all(out_dir)?;
    let session = service.start("replay://local", None)?;

    let mut summary = ReplaySummary {
        session,
        frames_read: 0,
        frames_rejected: 0,
        locked: Vec::new(),
        status: SessionStatus::InProgress,
    };

    for path in frames {
        let bytes = std::fs::read(path)?;
        summary.frames_read += 1;

        let outcome = match service.add_frame(session, &bytes) {
            Ok(outcome) => outcome,
            Err(ScanError::ScanAlreadyFinished(_)) => break,
            Err(err @ (ScanError::ImageDecode(_) | ScanError::Precondition { .. })) => {
                let human = humanize_error(&err);
                warn!(frame = %path.display(), error = %err, hint = %human.suggestion, "frame rejected");
                summary.frames_rejected += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        debug!(frame = %path.display(), hint = %service.hint(&outcome), "frame processed");

        if outcome.finished {
            if let Some(card) = &outcome.rectified {
                let preview = out_dir.join(format!("{}.jpg", outcome.side));
                std::fs::write(&preview, to_jpeg_bytes(card, PREVIEW_QUALITY)?)?;
                info!(side = %outcome.side, path = %preview.display(), "side captured");
            }
            summary.locked.push(outcome.side);
        }
        if outcome.scan_complete {
            break;
        }
    }

    if let Some(inputs) = confirm {
        let confirmation = service.confirm(
            session,
            &std::fs::read(&inputs.front)?,
            &std::fs::read(&inputs.back)?,
            &std::fs::read(&inputs.face)?,
        )?;
        std::fs::write(out_dir.join("front_confirmed.jpg"), &confirmation.front_jpeg)?;
        std::fs::write(out_dir.join("back_confirmed.jpg"), &confirmation.back_jpeg)?;
        if let Some(mrz) = &confirmation.mrz {
            info!(%mrz, "MRZ read");
        }
    }

    summary.status = service.status(session)?.0;
    info!(
        read = summary.frames_read,
        rejected = summary.frames_rejected,
        locked = summary.locked.len(),
        status = summary.status.keyword(),
        "replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::collaborators::{LogNotifier, ThumbnailMatcher};
    use cardscan_core::ScanConfig;
    use cardscan_session::MemorySessionStore;
    use cardscan_vision::image::processor::to_png_bytes;
    use image::{Rgb, RgbImage};

    fn card_png() -> Vec<u8> {
        let frame = RgbImage::from_fn(1280, 800, |x, y| {
            if (200..1080).contains(&x) && (160..640).contains(&y) {
                Rgb([235, 230, 220])
            } else {
                Rgb([25, 25, 30])
            }
        });
        to_png_bytes(&frame).unwrap()
    }

    fn service() -> ScanService<MemorySessionStore> {
        ScanService::new(
            MemorySessionStore::new(),
            &ScanConfig::default(),
            Arc::new(ThumbnailMatcher),
            Arc::new(LogNotifier),
        )
    }

    #[test]
    fn frame_listing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = frame_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.jpeg"]);
    }

    #[test]
    fn replay_locks_both_sides_and_confirms() {
        let frames_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let png = card_png();

        let mut frames = Vec::new();
        for i in 0..30 {
            let path = frames_dir.path().join(format!("frame_{i:03}.png"));
            std::fs::write(&path, &png).unwrap();
            frames.push(path);
        }
        // A corrupt frame in the middle is skipped, not fatal.
        std::fs::write(&frames[3], b"garbage").unwrap();

        let card = frames[0].clone();
        let confirm = ConfirmInputs {
            front: card.clone(),
            back: card.clone(),
            face: card,
        };

        let summary = replay(&service(), &frames, out_dir.path(), Some(&confirm)).unwrap();
        assert_eq!(summary.locked, vec![Side::Front, Side::Back]);
        assert_eq!(summary.frames_rejected, 1);
        assert_eq!(summary.frames_read, 23);
        assert_ne!(summary.status, SessionStatus::InProgress);

        for name in ["front.jpg", "back.jpg", "front_confirmed.jpg", "back_confirmed.jpg"] {
            assert!(out_dir.path().join(name).is_file(), "missing {name}");
        }
    }

    #[test]
    fn replay_without_cards_stays_in_progress() {
        let frames_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let blank = to_png_bytes(&RgbImage::from_pixel(1280, 800, Rgb([25, 25, 30]))).unwrap();
        let path = frames_dir.path().join("blank.png");
        std::fs::write(&path, blank).unwrap();

        let summary = replay(&service(), &[path], out_dir.path(), None).unwrap();
        assert!(summary.locked.is_empty());
        assert_eq!(summary.status, SessionStatus::InProgress);
    }
}
