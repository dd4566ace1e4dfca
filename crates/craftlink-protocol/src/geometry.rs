//! World-space vectors, grid cells, and the two direction vocabularies.
//!
//! Scans use fixed world axes ([`ScanDirection`]); commands address cells in
//! the actor's own right/up/forward basis ([`LocalDirection`]).

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Missing components deserialize as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const RIGHT: Self = Self::new(1.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// The grid cell containing this point (component-wise floor).
    pub fn cell(self) -> CellPos {
        CellPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Nearest grid cell (component-wise round), used for basis vectors and
    /// offsets that are expected to be integral.
    pub fn round_cell(self) -> CellPos {
        CellPos::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.z.round() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Integer coordinates of one world grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: CellPos, steps: i32) -> Self {
        Self::new(
            self.x + delta.x * steps,
            self.y + delta.y * steps,
            self.z + delta.z * steps,
        )
    }

    /// Taxicab (L1) distance between two cells.
    pub fn taxicab_distance(self, other: CellPos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + self.z.abs_diff(other.z)
    }

    pub fn as_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

impl Add for CellPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// World axis used by the six-direction scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl ScanDirection {
    pub const ALL: [ScanDirection; 6] = [
        ScanDirection::Up,
        ScanDirection::Down,
        ScanDirection::North,
        ScanDirection::South,
        ScanDirection::East,
        ScanDirection::West,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
        }
    }

    pub fn unit(self) -> CellPos {
        match self {
            Self::Up => CellPos::new(0, 1, 0),
            Self::Down => CellPos::new(0, -1, 0),
            Self::North => CellPos::new(0, 0, 1),
            Self::South => CellPos::new(0, 0, -1),
            Self::East => CellPos::new(1, 0, 0),
            Self::West => CellPos::new(-1, 0, 0),
        }
    }
}

/// Direction named relative to the actor's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalDirection {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl LocalDirection {
    /// Parse the planner's direction vocabulary. Case-insensitive; accepts
    /// `backward`/`backwards` as aliases of `back`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "forward" | "front" => Some(Self::Forward),
            "back" | "backward" | "backwards" => Some(Self::Back),
            _ => None,
        }
    }
}

/// Position plus orthonormal local basis of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorPose {
    pub position: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
}

impl ActorPose {
    /// Pose at `position` facing world +z with world +y up.
    pub fn axis_aligned(position: Vec3) -> Self {
        Self {
            position,
            right: Vec3::RIGHT,
            up: Vec3::UP,
            forward: Vec3::FORWARD,
        }
    }

    /// Convert an offset expressed as (right, up, forward) into world space.
    pub fn local_to_world(&self, offset: Vec3) -> Vec3 {
        self.right * offset.x + self.up * offset.y + self.forward * offset.z
    }

    pub fn direction(&self, direction: LocalDirection) -> Vec3 {
        match direction {
            LocalDirection::Up => self.up,
            LocalDirection::Down => self.up * -1.0,
            LocalDirection::Right => self.right,
            LocalDirection::Left => self.right * -1.0,
            LocalDirection::Forward => self.forward,
            LocalDirection::Back => self.forward * -1.0,
        }
    }

    /// Cells starting at the actor's cell shifted by `start_offset` (local
    /// basis), stepping `count` cells along `direction`.
    pub fn expand_cells(
        &self,
        start_offset: Vec3,
        direction: LocalDirection,
        count: u32,
    ) -> Vec<CellPos> {
        let start = self.position.cell() + self.local_to_world(start_offset).round_cell();
        let step = self.direction(direction).round_cell();
        (0..count as i32).map(|i| start.offset(step, i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_floors_negative_coordinates() {
        assert_eq!(Vec3::new(-0.5, 2.9, 0.0).cell(), CellPos::new(-1, 2, 0));
    }

    #[test]
    fn taxicab_distance_sums_axes() {
        let a = CellPos::new(0, 0, 0);
        assert_eq!(a.taxicab_distance(CellPos::new(2, -3, 1)), 6);
    }

    #[test]
    fn expand_up_from_axis_aligned_pose() {
        let pose = ActorPose::axis_aligned(Vec3::new(5.0, 10.0, 5.0));
        let cells = pose.expand_cells(Vec3::ZERO, LocalDirection::Up, 3);
        assert_eq!(
            cells,
            vec![
                CellPos::new(5, 10, 5),
                CellPos::new(5, 11, 5),
                CellPos::new(5, 12, 5)
            ]
        );
    }

    #[test]
    fn forward_follows_actor_basis_not_world_axes() {
        // Facing world +x: local forward is +x, local right is -z.
        let pose = ActorPose {
            position: Vec3::new(0.0, 0.0, 0.0),
            right: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::UP,
            forward: Vec3::new(1.0, 0.0, 0.0),
        };
        let cells = pose.expand_cells(Vec3::new(1.0, 0.0, 0.0), LocalDirection::Forward, 2);
        assert_eq!(cells, vec![CellPos::new(0, 0, -1), CellPos::new(1, 0, -1)]);
    }

    #[test]
    fn direction_aliases_parse() {
        assert_eq!(LocalDirection::parse("Backward"), Some(LocalDirection::Back));
        assert_eq!(LocalDirection::parse(" up "), Some(LocalDirection::Up));
        assert_eq!(LocalDirection::parse("sideways"), None);
    }
}
