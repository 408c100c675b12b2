use crate::dialect::Dialect;
use crate::driver::{Driver, SessionId};
use crate::surface::{SourceSurface, SurfaceId, VolumeSurface};
use crate::types::{
    DeviceSnapshot, DeviceSource, LinkState, SourceState, SourceStatus, SourceUpdate, VolumeState,
    VolumeUpdate, VolumeValue, FALLBACK_VOLUME,
};

/// One live pairing of a driver with its two surfaces
///
/// The adapter keeps a mirror of what each surface currently shows, so that
/// every surface update goes through [`Session::update_volume`] or
/// [`Session::update_source`] and the two never drift apart.
pub(crate) struct Session {
    pub id: SessionId,
    pub driver: Box<dyn Driver>,
    pub link: LinkState,
    volume: Option<Published<Box<dyn VolumeSurface>, VolumeState>>,
    source: Option<Published<Box<dyn SourceSurface>, SourceState>>,
}

struct Published<S, T> {
    surface: S,
    state: T,
}

impl Session {
    pub fn new(id: SessionId, driver: Box<dyn Driver>) -> Self {
        Self {
            id,
            driver,
            link: LinkState::Connecting,
            volume: None,
            source: None,
        }
    }

    pub fn has_surfaces(&self) -> bool {
        self.volume.is_some() || self.source.is_some()
    }

    pub fn publish(
        &mut self,
        volume: (Box<dyn VolumeSurface>, VolumeState),
        source: (Box<dyn SourceSurface>, SourceState),
    ) {
        // a second connect without a disconnect must not leak the old pair
        self.destroy_surfaces();
        self.volume = Some(Published {
            surface: volume.0,
            state: volume.1,
        });
        self.source = Some(Published {
            surface: source.0,
            state: source.1,
        });
    }

    pub fn destroy_surfaces(&mut self) {
        if let Some(published) = self.source.take() {
            published.surface.destroy();
        }
        if let Some(published) = self.volume.take() {
            published.surface.destroy();
        }
    }

    pub fn volume_state(&self) -> Option<&VolumeState> {
        self.volume.as_ref().map(|p| &p.state)
    }

    pub fn source_state(&self) -> Option<&SourceState> {
        self.source.as_ref().map(|p| &p.state)
    }

    pub fn volume_id(&self) -> Option<SurfaceId> {
        self.volume.as_ref().map(|p| p.surface.id())
    }

    pub fn source_id(&self) -> Option<SurfaceId> {
        self.source.as_ref().map(|p| p.surface.id())
    }

    /// Push a partial update to the volume surface, if one is published
    pub fn update_volume(&mut self, update: VolumeUpdate) {
        if let Some(published) = self.volume.as_mut() {
            published.state.apply(&update);
            published.surface.update(&update);
        }
    }

    pub fn update_source(&mut self, update: SourceUpdate) {
        if let Some(published) = self.source.as_mut() {
            published.state.apply(&update);
            published.surface.update(&update);
        }
    }
}

/// Volume surface state for a freshly connected device
///
/// A missing or zero volume reading is shown as [`FALLBACK_VOLUME`].
pub fn project_volume(volume: Option<VolumeValue>, source: Option<&DeviceSource>) -> VolumeState {
    let volume_value = match volume {
        Some(v) if v > 0 => v,
        _ => FALLBACK_VOLUME,
    };
    VolumeState::new(volume_value, matches!(source, Some(DeviceSource::Muted)))
}

/// Source surface status for a device source and the configured presence source
pub fn project_source_status(source: Option<&DeviceSource>, presence_source: &str) -> SourceStatus {
    match source {
        Some(DeviceSource::Standby) => SourceStatus::Standby,
        Some(DeviceSource::Source(code)) if code == presence_source => SourceStatus::Selected,
        _ => SourceStatus::Deselected,
    }
}

/// Normalized source of a snapshot, using the dialect's sentinels
pub fn snapshot_source(snapshot: &DeviceSnapshot, dialect: Dialect) -> Option<DeviceSource> {
    snapshot.source.as_deref().map(|raw| dialect.classify(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(code: &str) -> DeviceSource {
        DeviceSource::Source(code.to_string())
    }

    #[test]
    fn test_project_volume_fallback() {
        assert_eq!(project_volume(Some(0), None).volume_value, FALLBACK_VOLUME);
        assert_eq!(project_volume(None, None).volume_value, FALLBACK_VOLUME);
        assert_eq!(project_volume(Some(-3), None).volume_value, FALLBACK_VOLUME);
        assert_eq!(project_volume(Some(30), None).volume_value, 30);
    }

    #[test]
    fn test_project_volume_mute() {
        assert!(project_volume(Some(30), Some(&DeviceSource::Muted)).is_muted);
        assert!(!project_volume(Some(30), Some(&DeviceSource::Standby)).is_muted);
        assert!(!project_volume(Some(30), Some(&src("CD"))).is_muted);
    }

    #[test]
    fn test_project_source_status() {
        assert_eq!(
            project_source_status(Some(&DeviceSource::Standby), "CD"),
            SourceStatus::Standby
        );
        assert_eq!(project_source_status(Some(&src("CD")), "CD"), SourceStatus::Selected);
        assert_eq!(project_source_status(Some(&src("TV")), "CD"), SourceStatus::Deselected);
        assert_eq!(
            project_source_status(Some(&DeviceSource::Muted), "CD"),
            SourceStatus::Deselected
        );
        assert_eq!(project_source_status(None, "CD"), SourceStatus::Deselected);
    }

    #[test]
    fn test_snapshot_source_uses_dialect() {
        let snapshot = DeviceSnapshot {
            volume: Some(10),
            source: Some("SB".to_string()),
            connected: true,
        };
        assert_eq!(
            snapshot_source(&snapshot, Dialect::Zone218),
            Some(DeviceSource::Standby)
        );
        assert_eq!(snapshot_source(&snapshot, Dialect::Tn51), Some(src("SB")));
        assert_eq!(snapshot_source(&DeviceSnapshot::default(), Dialect::Tn51), None);
    }
}
