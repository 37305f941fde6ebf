//! Processing profile changes
//!
//! Changing the `(enhanced, preset)` identity makes every decoded buffer
//! stale: the cache is cleared, the slot table reset, and in-flight loads are
//! orphaned through the generation counter. The chunk at the current position
//! and its successor are preloaded in parallel under the new identity, then
//! playback resumes from the saved position if it is still meant to play.

use lapstream_common::events::PlayerState;
use tracing::{debug, info};

use super::core::PlaybackEngine;
use crate::error::{Error, Result};
use crate::stream::ProcessingProfile;

impl PlaybackEngine {
    /// Enable or disable server-side enhancement with an optional preset
    pub async fn set_enhanced(&self, enabled: bool, preset: Option<String>) -> Result<()> {
        let mut profile = self.profile();
        profile.enhanced = enabled;
        profile.preset = preset;
        self.apply_profile(profile).await
    }

    /// Switch preset, keeping the current enhancement flag
    pub async fn set_preset(&self, preset: Option<String>) -> Result<()> {
        let mut profile = self.profile();
        profile.preset = preset;
        self.apply_profile(profile).await
    }

    /// Set processing intensity for future chunk requests.
    ///
    /// Intensity is not part of the cache identity, so resident chunks are
    /// kept and nothing is refetched.
    pub fn set_intensity(&self, intensity: f32) -> Result<()> {
        if !intensity.is_finite() {
            return Err(Error::InvalidInput("intensity must be a finite number".to_string()));
        }
        let intensity = intensity.clamp(0.0, 1.0);
        self.lock().profile.intensity = intensity;
        debug!("Intensity set to {:.2}", intensity);
        Ok(())
    }

    /// Apply a processing profile, swapping audio in place if the identity changes.
    ///
    /// If playback was active the engine holds `Seeking` at the saved position
    /// during the preload. A `pause()` issued meanwhile cancels the resume; a
    /// `stop()`, seek, load or newer profile change takes over entirely.
    pub async fn apply_profile(&self, profile: ProcessingProfile) -> Result<()> {
        let (swap, position, preload) = {
            let mut guard = self.lock();
            let core = &mut *guard;
            if core.shut_down {
                return Err(Error::InvalidState("engine is shut down".to_string()));
            }

            if core.profile.same_identity(&profile) {
                core.profile.intensity = profile.intensity;
                return Ok(());
            }

            info!(
                "Processing profile: enhanced={} preset={:?} -> enhanced={} preset={:?}",
                core.profile.enhanced, core.profile.preset, profile.enhanced, profile.preset
            );

            let was_playing =
                core.state.is_active() || (core.state == PlayerState::Seeking && core.resume_after_seek);
            let position = core.position();

            core.profile = profile;
            core.generation += 1;
            core.cache.clear();
            core.queue.clear();
            core.queue.clear_active();
            if let Some(session) = core.session.as_mut() {
                session.reset_slots();
            }

            let Some(metadata) = core.metadata() else {
                // Nothing loaded yet; the next track loads with the new profile
                return Ok(());
            };

            let swap = if matches!(
                core.state,
                PlayerState::Playing | PlayerState::Buffering | PlayerState::Seeking
            ) {
                self.stop_sounding_locked(core);
                core.clock.hold(position);
                core.resume_after_seek = was_playing;
                core.seek_seq += 1;
                self.set_state_locked(core, PlayerState::Seeking);
                Some((core.seek_seq, core.generation))
            } else {
                None
            };

            let (index, _) = metadata.locate(position);
            let next = (index + 1 < metadata.total_chunks).then_some(index + 1);
            (swap, position, (index, next))
        };
        self.bump_slot_version();

        let (index, next) = preload;
        match next {
            Some(next) => {
                tokio::join!(self.preload_chunk(index), self.preload_chunk(next));
            }
            None => self.preload_chunk(index).await,
        }

        let Some((seek_seq, generation)) = swap else {
            return Ok(());
        };
        {
            let core = self.lock();
            if core.seek_seq != seek_seq || core.generation != generation || core.state != PlayerState::Seeking {
                debug!("Profile swap overtaken during preload, not resuming");
                return Ok(());
            }
        }

        // Lands Paused or Playing depending on `resume_after_seek`, which a
        // pause during the preload has cleared
        self.seek(position).await?;
        Ok(())
    }
}