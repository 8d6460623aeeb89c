use crate::types::WorldAlignment;

/// Near clip plane for every projection matrix, in meters.
pub const Z_NEAR: f32 = 0.001;
/// Far clip plane for every projection matrix, in meters.
pub const Z_FAR: f32 = 1000.0;

pub const ENV_CV_SCALE_FACTOR: &str = "XRBRIDGE_CV_SCALE_FACTOR";
pub const ENV_WORLD_ALIGNMENT: &str = "XRBRIDGE_WORLD_ALIGNMENT";
pub const ENV_PUMP_CAPACITY: &str = "XRBRIDGE_PUMP_CAPACITY";

/// Session-level settings that do not change per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeConfig {
    /// Divisor applied to the camera intrinsics in computer-vision snapshots,
    /// matching the resolution the consumer-side decoder works at.
    pub cv_image_scale_factor: f32,
    /// Alignment the tracking session runs with; reported as `geo_aligned`.
    pub world_alignment: WorldAlignment,
    /// Bound of the frame channel feeding a [`FramePump`](crate::pump::FramePump).
    pub pump_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cv_image_scale_factor: 1.0,
            world_alignment: WorldAlignment::Gravity,
            pump_capacity: 2,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `XRBRIDGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values returned by `lookup` for each variable name.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cv_image_scale_factor = read_f32(&lookup, ENV_CV_SCALE_FACTOR, defaults.cv_image_scale_factor);
        let cv_image_scale_factor = if cv_image_scale_factor.is_finite() && cv_image_scale_factor > 0.0 {
            cv_image_scale_factor
        } else {
            log::warn!(
                "{}={} is not a positive scale, using {}",
                ENV_CV_SCALE_FACTOR,
                cv_image_scale_factor,
                defaults.cv_image_scale_factor
            );
            defaults.cv_image_scale_factor
        };

        let world_alignment = match read_string(&lookup, ENV_WORLD_ALIGNMENT, "gravity").as_str() {
            "gravity" => WorldAlignment::Gravity,
            "gravity_and_heading" | "gravityandheading" | "heading" => WorldAlignment::GravityAndHeading,
            "camera" => WorldAlignment::Camera,
            other => {
                log::warn!(
                    "Unknown {}='{}', using gravity (supported: gravity|gravity_and_heading|camera)",
                    ENV_WORLD_ALIGNMENT,
                    other
                );
                defaults.world_alignment
            }
        };

        let pump_capacity = read_usize(&lookup, ENV_PUMP_CAPACITY, defaults.pump_capacity).max(1);

        Self {
            cv_image_scale_factor,
            world_alignment,
            pump_capacity,
        }
    }

    pub fn is_geo_aligned(&self) -> bool {
        self.world_alignment == WorldAlignment::GravityAndHeading
    }
}

fn read_f32<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: f32) -> f32 {
    match lookup(name) {
        Some(v) => v.trim().parse::<f32>().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}='{}'", name, v);
            default
        }),
        None => default,
    }
}

fn read_usize<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: usize) -> usize {
    match lookup(name) {
        Some(v) => v.trim().parse::<usize>().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}='{}'", name, v);
            default
        }),
        None => default,
    }
}

fn read_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: &str) -> String {
    lookup(name)
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let cfg = BridgeConfig::from_lookup(|_| None);
        assert_eq!(cfg, BridgeConfig::default());
        assert!(!cfg.is_geo_aligned());
    }

    #[test]
    fn test_overrides() {
        let cfg = BridgeConfig::from_lookup(lookup_from(&[
            (ENV_CV_SCALE_FACTOR, " 4 "),
            (ENV_WORLD_ALIGNMENT, "Gravity_And_Heading"),
            (ENV_PUMP_CAPACITY, "8"),
        ]));
        assert_eq!(cfg.cv_image_scale_factor, 4.0);
        assert!(cfg.is_geo_aligned());
        assert_eq!(cfg.pump_capacity, 8);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = BridgeConfig::from_lookup(lookup_from(&[
            (ENV_CV_SCALE_FACTOR, "-2"),
            (ENV_WORLD_ALIGNMENT, "sideways"),
            (ENV_PUMP_CAPACITY, "0"),
        ]));
        assert_eq!(cfg.cv_image_scale_factor, 1.0);
        assert_eq!(cfg.world_alignment, WorldAlignment::Gravity);
        assert_eq!(cfg.pump_capacity, 1);
    }
}
