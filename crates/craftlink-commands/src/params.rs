use craftlink_protocol::{ActorPose, CellPos, LocalDirection, Vec3};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::CommandFailure;

/// Upper bound on cells a single command may touch.
pub const MAX_EXPANSION: u32 = 64;

/// Largest `start_offset` component accepted, in cells from the actor.
pub const MAX_START_OFFSET: f32 = 256.0;

/// Decode a command's opaque params text. Blank text is treated as `{}`.
pub fn parse_params<T: DeserializeOwned>(params: &str) -> Result<T, CommandFailure> {
    let text = if params.trim().is_empty() { "{}" } else { params };
    serde_json::from_str(text).map_err(|error| CommandFailure::MalformedParams(error.to_string()))
}

/// Cell selection shared by the block and movement commands: an offset in
/// the actor's right/up/forward basis, expanded `count` cells along a local
/// direction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TargetParams {
    pub start_offset: Vec3,
    pub expand_direction: String,
    pub count: u32,
}

impl Default for TargetParams {
    fn default() -> Self {
        Self {
            start_offset: Vec3::ZERO,
            expand_direction: "up".to_owned(),
            count: 1,
        }
    }
}

impl TargetParams {
    /// Target cells in expansion order. A count of zero selects one cell.
    pub fn resolve(&self, pose: &ActorPose) -> Result<Vec<CellPos>, CommandFailure> {
        let direction = LocalDirection::parse(&self.expand_direction)
            .ok_or_else(|| CommandFailure::InvalidDirection(self.expand_direction.clone()))?;
        let offset = self.start_offset;
        if [offset.x, offset.y, offset.z]
            .iter()
            .any(|component| !component.is_finite() || component.abs() > MAX_START_OFFSET)
        {
            return Err(CommandFailure::MalformedParams(format!(
                "start_offset ({}, {}, {}) is beyond {MAX_START_OFFSET} cells",
                offset.x, offset.y, offset.z
            )));
        }
        if self.count > MAX_EXPANSION {
            return Err(CommandFailure::MalformedParams(format!(
                "count {} exceeds {MAX_EXPANSION}",
                self.count
            )));
        }
        Ok(pose.expand_cells(self.start_offset, direction, self.count.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_offsets_default_to_zero() {
        let params: TargetParams =
            parse_params(r#"{"start_offset":{"z":2},"expand_direction":"right","count":2}"#)
                .unwrap();
        let pose = ActorPose::axis_aligned(Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(
            params.resolve(&pose).unwrap(),
            vec![CellPos::new(0, 0, 2), CellPos::new(1, 0, 2)]
        );
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let params: TargetParams = parse_params(r#"{"expand_direction":"sideways"}"#).unwrap();
        let pose = ActorPose::axis_aligned(Vec3::ZERO);
        assert_eq!(
            params.resolve(&pose),
            Err(CommandFailure::InvalidDirection("sideways".into()))
        );
    }

    #[test]
    fn far_start_offset_is_malformed() {
        let pose = ActorPose::axis_aligned(Vec3::new(5.0, 10.0, 5.0));
        let params: TargetParams = parse_params(
            r#"{"start_offset":{"x":3e9},"expand_direction":"right","count":2}"#,
        )
        .unwrap();
        assert!(matches!(
            params.resolve(&pose),
            Err(CommandFailure::MalformedParams(_))
        ));

        let params: TargetParams =
            parse_params(r#"{"start_offset":{"y":-256},"count":2}"#).unwrap();
        assert_eq!(
            params.resolve(&pose).unwrap(),
            vec![CellPos::new(5, -246, 5), CellPos::new(5, -245, 5)]
        );
    }

    #[test]
    fn blank_params_use_defaults() {
        let params: TargetParams = parse_params("  ").unwrap();
        assert_eq!(params, TargetParams::default());
        assert!(matches!(
            parse_params::<TargetParams>("{not json"),
            Err(CommandFailure::MalformedParams(_))
        ));
    }
}
