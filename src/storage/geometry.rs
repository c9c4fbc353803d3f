//! Disk geometry and the access-time cost model
//!
//! The model is instrumentation only: it turns a block id into a simulated
//! latency (seek + rotation + transfer, or a flat cache hit) so that indexed
//! and linear access paths can be compared. It never affects what is read.

use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};

/// Physical parameters of the simulated disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskGeometry {
    pub surfaces: usize,
    pub blocks_per_sector: usize,
    pub sectors_per_track: usize,
    /// Spindle speed in revolutions per minute
    pub rpm: f64,
    /// Probability that a block is served from the drive cache
    pub cache_hit_rate: f64,
    pub cache_access_ms: f64,
    /// Fixed cost of any head movement
    pub seek_base_ms: f64,
    /// Additional cost of a full-stroke seek
    pub seek_span_ms: f64,
    pub transfer_rate_mb_per_s: f64,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        Self {
            surfaces: 1,
            blocks_per_sector: 2,
            sectors_per_track: 256,
            rpm: 5400.0,
            cache_hit_rate: 0.1,
            cache_access_ms: 0.001,
            seek_base_ms: 0.004,
            seek_span_ms: 0.010,
            transfer_rate_mb_per_s: 100.0,
        }
    }
}

impl DiskGeometry {
    pub fn validate(&self) -> StorageResult<()> {
        if self.surfaces == 0 || self.blocks_per_sector == 0 || self.sectors_per_track == 0 {
            return Err(StorageError::InvalidArgument(
                "disk geometry counts must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache_hit_rate) {
            return Err(StorageError::InvalidArgument(format!(
                "cache hit rate {} is not a probability",
                self.cache_hit_rate
            )));
        }
        for (name, value) in [
            ("rpm", self.rpm),
            ("transfer_rate_mb_per_s", self.transfer_rate_mb_per_s),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(StorageError::InvalidArgument(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        // Every cost feeds a Duration, which cannot be negative
        for (name, value) in [
            ("cache_access_ms", self.cache_access_ms),
            ("seek_base_ms", self.seek_base_ms),
            ("seek_span_ms", self.seek_span_ms),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(StorageError::InvalidArgument(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Number of tracks on one surface (at least 1)
    pub fn tracks(&self, disk_size: usize, block_size: usize) -> usize {
        let bytes_per_sector = self.blocks_per_sector * block_size;
        if bytes_per_sector == 0 {
            return 1;
        }
        (disk_size / self.sectors_per_track / bytes_per_sector / self.surfaces).max(1)
    }

    /// Track on which a block lives
    pub fn track_of(&self, block_id: usize, tracks: usize) -> usize {
        block_id % tracks.max(1)
    }

    /// Linear seek model: base cost plus a share of the full stroke
    pub fn seek_time_ms(&self, distance: usize, tracks: usize) -> f64 {
        self.seek_base_ms + (distance as f64 / tracks.max(1) as f64) * self.seek_span_ms
    }

    /// Delay until the block's sector rotates under the head
    ///
    /// Blocks are spread evenly over the tracks; the platter is assumed to
    /// start each access at angle zero and to rotate the short way round.
    pub fn rotational_delay_ms(&self, block_id: usize, total_blocks: usize, tracks: usize) -> f64 {
        let blocks_per_track = total_blocks as f64 / tracks.max(1) as f64;
        if blocks_per_track < 1.0 {
            return 0.0;
        }

        let sector_position = block_id % (blocks_per_track as usize);
        let degrees_per_sector = 360.0 / blocks_per_track;
        let mut angular_distance = sector_position as f64 * degrees_per_sector;
        if angular_distance > 180.0 {
            angular_distance = 360.0 - angular_distance;
        }

        let full_rotation_ms = 60_000.0 / self.rpm;
        (angular_distance / 360.0) * full_rotation_ms
    }

    /// Time to move one block's bytes off the platter
    pub fn transfer_time_ms(&self, block_size: usize) -> f64 {
        let block_size_mb = block_size as f64 / (1024.0 * 1024.0);
        let rate_mb_per_ms = self.transfer_rate_mb_per_s / 1000.0;
        block_size_mb / rate_mb_per_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tracks() {
        // 500MB / 256 sectors / 400 bytes per sector
        let geometry = DiskGeometry::default();
        assert_eq!(geometry.tracks(524_288_000, 200), 5120);
    }

    #[test]
    fn test_tiny_disk_has_one_track() {
        let geometry = DiskGeometry::default();
        assert_eq!(geometry.tracks(400, 200), 1);
        assert_eq!(geometry.track_of(7, 1), 0);
    }

    #[test]
    fn test_seek_grows_with_distance() {
        let geometry = DiskGeometry::default();
        let near = geometry.seek_time_ms(1, 100);
        let far = geometry.seek_time_ms(90, 100);
        assert!(far > near);
        assert_eq!(geometry.seek_time_ms(0, 100), geometry.seek_base_ms);
    }

    #[test]
    fn test_rotation_takes_short_way_round() {
        let geometry = DiskGeometry::default();
        // 4 blocks per track: sector 1 is 90 degrees away, sector 3 is 270 -> 90
        let a = geometry.rotational_delay_ms(1, 40, 10);
        let b = geometry.rotational_delay_ms(3, 40, 10);
        assert!((a - b).abs() < 1e-9);
        assert!(a > 0.0);
        assert_eq!(geometry.rotational_delay_ms(0, 40, 10), 0.0);
    }

    #[test]
    fn test_transfer_time() {
        let geometry = DiskGeometry::default();
        let expected = (200.0 / (1024.0 * 1024.0)) / 0.1;
        assert!((geometry.transfer_time_ms(200) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(DiskGeometry::default().validate().is_ok());

        let bad = DiskGeometry {
            cache_hit_rate: 1.5,
            ..DiskGeometry::default()
        };
        assert!(bad.validate().is_err());

        let bad = DiskGeometry {
            sectors_per_track: 0,
            ..DiskGeometry::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_costs() {
        let cases = [
            DiskGeometry {
                cache_access_ms: -1.0,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                seek_base_ms: -0.5,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                seek_span_ms: -0.01,
                ..DiskGeometry::default()
            },
        ];
        for geometry in cases {
            assert!(
                matches!(geometry.validate(), Err(StorageError::InvalidArgument(_))),
                "accepted {:?}",
                geometry
            );
        }

        // Zero cost is allowed
        let free = DiskGeometry {
            cache_access_ms: 0.0,
            seek_base_ms: 0.0,
            seek_span_ms: 0.0,
            ..DiskGeometry::default()
        };
        assert!(free.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let cases = [
            DiskGeometry {
                rpm: f64::INFINITY,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                rpm: f64::NAN,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                transfer_rate_mb_per_s: f64::INFINITY,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                cache_access_ms: f64::NAN,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                seek_base_ms: f64::INFINITY,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                seek_span_ms: f64::NAN,
                ..DiskGeometry::default()
            },
            DiskGeometry {
                cache_hit_rate: f64::NAN,
                ..DiskGeometry::default()
            },
        ];
        for geometry in cases {
            assert!(geometry.validate().is_err(), "accepted {:?}", geometry);
        }
    }
}
