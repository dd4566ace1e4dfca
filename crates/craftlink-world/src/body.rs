use craftlink_protocol::{ActorPose, AgentBody, Vec3};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct SimulatedBody {
    pose: Mutex<ActorPose>,
    frozen: Mutex<bool>,
}

impl SimulatedBody {
    pub fn new(pose: ActorPose) -> Self {
        Self {
            pose: Mutex::new(pose),
            frozen: Mutex::new(false),
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(ActorPose::axis_aligned(position))
    }

    /// While frozen, `set_position` is ignored (the body is stuck).
    pub fn set_frozen(&self, frozen: bool) {
        *self.frozen.lock() = frozen;
    }

    pub fn position(&self) -> Vec3 {
        self.pose.lock().position
    }
}

impl AgentBody for SimulatedBody {
    fn pose(&self) -> ActorPose {
        *self.pose.lock()
    }

    fn set_position(&self, position: Vec3) {
        if !*self.frozen.lock() {
            self.pose.lock().position = position;
        }
    }
}
