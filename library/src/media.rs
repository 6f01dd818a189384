use async_trait::async_trait;
use gant_meet_protocol::{TrackId, TrackKind};
use log::{debug, info};

use crate::error::Result;
use crate::events::TrackEndedSink;
use crate::transport::{PeerTransport, RtpSender};

/// Local capture track, a `MediaStreamTrack` in the browser.
///
/// Clones refer to the same underlying capture.
pub trait LocalTrack: Clone {
    fn id(&self) -> TrackId;
    fn kind(&self) -> TrackKind;
    fn label(&self) -> String;
    /// Stop capturing. Calling it on a stopped track does nothing.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Access to capture devices.
#[async_trait(?Send)]
pub trait MediaDevices {
    type Track: LocalTrack;

    /// Ask for one camera and one microphone track.
    ///
    /// # Errors
    /// [`crate::Error::MediaAccessDenied`] if the user refused or no device is present.
    async fn camera_and_microphone(&self) -> Result<Vec<Self::Track>>;

    /// Ask the user to pick a screen, window or tab.
    /// `ended` must be notified when the capture stops without us asking.
    ///
    /// # Errors
    /// [`crate::Error::NoSourceSelected`] when the picker was dismissed,
    /// [`crate::Error::MediaAccessDenied`] when capture is not permitted.
    async fn screen(&self, ended: TrackEndedSink) -> Result<Self::Track>;
}

/// How a screen capture reaches the remote peer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ScreenShareMode {
    /// Swap the screen into the camera's video sender, no renegotiation needed
    #[default]
    ReplaceCamera,
    /// Send the screen as an additional track and renegotiate
    AddTrack,
}

/// Owns every local track, so releasing them is a single call.
#[derive(Debug)]
pub struct MediaTrackController<T> {
    camera: Vec<T>,
    screen: Option<T>,
}

impl<T> Default for MediaTrackController<T> {
    fn default() -> Self {
        Self {
            camera: Vec::new(),
            screen: None,
        }
    }
}

impl<T: LocalTrack> MediaTrackController<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire camera and microphone unless already held.
    ///
    /// # Errors
    /// Propagates device errors, nothing is held in that case.
    pub async fn acquire_camera_and_mic<D>(&mut self, devices: &D) -> Result<&[T]>
    where
        D: MediaDevices<Track = T> + ?Sized,
    {
        if self.camera.is_empty() {
            let tracks = devices.camera_and_microphone().await?;
            info!("acquired {} local tracks", tracks.len());
            self.camera = tracks;
        }
        Ok(&self.camera)
    }

    /// # Errors
    /// Propagates device errors, a previous capture is kept in that case.
    pub async fn acquire_screen_share<D>(&mut self, devices: &D, ended: TrackEndedSink) -> Result<T>
    where
        D: MediaDevices<Track = T> + ?Sized,
    {
        if let Some(screen) = &self.screen {
            return Ok(screen.clone());
        }
        let screen = devices.screen(ended).await?;
        info!("screen capture started: {}", screen.label());
        self.screen = Some(screen.clone());
        Ok(screen)
    }

    pub fn camera(&self) -> &[T] {
        &self.camera
    }

    pub fn camera_video(&self) -> Option<&T> {
        self.camera.iter().find(|track| track.kind() == TrackKind::Video)
    }

    pub const fn screen(&self) -> Option<&T> {
        self.screen.as_ref()
    }

    pub const fn is_sharing_screen(&self) -> bool {
        self.screen.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.camera.is_empty() && self.screen.is_none()
    }

    /// Tracks that should be attached to a fresh connection.
    pub fn outbound_tracks(&self, mode: ScreenShareMode) -> Vec<T> {
        let mut tracks = Vec::with_capacity(self.camera.len() + 1);
        match (mode, &self.screen) {
            (ScreenShareMode::ReplaceCamera, Some(screen)) => {
                let mut replaced = false;
                for track in &self.camera {
                    if track.kind() == TrackKind::Video && !replaced {
                        tracks.push(screen.clone());
                        replaced = true;
                    } else {
                        tracks.push(track.clone());
                    }
                }
                if !replaced {
                    tracks.push(screen.clone());
                }
            }
            (ScreenShareMode::AddTrack, Some(screen)) => {
                tracks.extend(self.camera.iter().cloned());
                tracks.push(screen.clone());
            }
            (_, None) => tracks.extend(self.camera.iter().cloned()),
        }
        tracks
    }

    /// Stop and forget the screen capture, returning it if there was one.
    pub fn release_screen(&mut self) -> Option<T> {
        let screen = self.screen.take()?;
        screen.stop();
        debug!("screen capture {} released", screen.id());
        Some(screen)
    }

    /// Stop and forget every track.
    pub fn release_all(&mut self) {
        for track in self.camera.drain(..) {
            track.stop();
        }
        self.release_screen();
    }
}

/// Replace whatever the first video sender carries with `track`.
/// Returns the sender used as it was before the swap, `None` if the transport sends no video.
///
/// # Errors
/// Fails if the transport refuses the replacement.
pub async fn swap_outbound_video<P>(transport: &P, track: &P::Track) -> Result<Option<RtpSender>>
where
    P: PeerTransport + ?Sized,
{
    let Some(sender) = transport
        .senders()
        .into_iter()
        .find(|sender| sender.kind == TrackKind::Video)
    else {
        return Ok(None);
    };
    transport.replace_track(sender.id, track).await?;
    Ok(Some(sender))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loopback::{LoopbackDevices, CAMERA_LABEL};
    use futures::channel::mpsc;

    #[tokio::test]
    async fn replace_mode_puts_screen_in_the_camera_slot() {
        let devices = LoopbackDevices::new();
        let (inputs, _receiver) = mpsc::unbounded();
        let mut media = MediaTrackController::new();
        media.acquire_camera_and_mic(&devices).await.unwrap();
        let screen = media
            .acquire_screen_share(&devices, TrackEndedSink::new(inputs))
            .await
            .unwrap();

        let replaced = media.outbound_tracks(ScreenShareMode::ReplaceCamera);
        assert_eq!(replaced.len(), 2);
        assert!(replaced.iter().any(|track| track.id() == screen.id()));
        assert!(replaced
            .iter()
            .all(|track| track.kind() == TrackKind::Audio || track.id() == screen.id()));

        let added = media.outbound_tracks(ScreenShareMode::AddTrack);
        assert_eq!(added.len(), 3);
        assert_eq!(media.camera_video().map(LocalTrack::label).as_deref(), Some(CAMERA_LABEL));
    }

    #[tokio::test]
    async fn release_all_stops_every_track() {
        let devices = LoopbackDevices::new();
        let (inputs, _receiver) = mpsc::unbounded();
        let mut media = MediaTrackController::new();
        media.acquire_camera_and_mic(&devices).await.unwrap();
        media
            .acquire_screen_share(&devices, TrackEndedSink::new(inputs))
            .await
            .unwrap();

        media.release_all();
        media.release_all();

        assert!(media.is_empty());
        assert!(devices.issued().iter().all(|track| !track.is_live()));
    }
}
