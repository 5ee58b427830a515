//! 序列器与两条通道之间的接口
//!
//! `MotionSequencer` 只通过这两个 trait 访问控制器和夹爪，
//! 实际运行时由 `ControlChannel` / `ActuatorChannel` 实现。

use std::sync::Arc;
use std::time::Duration;

use urcell_gripper::{ActuatorChannel, GripperCommand, GripperError, GripperStatus};
use urcell_protocol::RecipeInstance;
use urcell_rtde::{ControlChannel, RtdeError};

pub trait ControlLink {
    /// 最新的控制器状态；`None` 表示通道已关闭
    fn receive(&mut self) -> Option<RecipeInstance>;
    fn send(&mut self, instance: &RecipeInstance) -> Result<(), RtdeError>;
    fn pause(&mut self) -> Result<(), RtdeError>;
    fn disconnect(&mut self);
}

pub trait GripperLink {
    fn move_to(&self, command: GripperCommand) -> Result<GripperCommand, GripperError>;
    fn wait_for_position(&self, timeout: Duration) -> Result<GripperStatus, GripperError>;
}

impl ControlLink for ControlChannel {
    fn receive(&mut self) -> Option<RecipeInstance> {
        ControlChannel::receive(self)
    }

    fn send(&mut self, instance: &RecipeInstance) -> Result<(), RtdeError> {
        ControlChannel::send(self, instance)
    }

    fn pause(&mut self) -> Result<(), RtdeError> {
        ControlChannel::pause(self)
    }

    fn disconnect(&mut self) {
        ControlChannel::disconnect(self)
    }
}

impl<T: ControlLink + ?Sized> ControlLink for &mut T {
    fn receive(&mut self) -> Option<RecipeInstance> {
        (**self).receive()
    }

    fn send(&mut self, instance: &RecipeInstance) -> Result<(), RtdeError> {
        (**self).send(instance)
    }

    fn pause(&mut self) -> Result<(), RtdeError> {
        (**self).pause()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

impl GripperLink for ActuatorChannel {
    fn move_to(&self, command: GripperCommand) -> Result<GripperCommand, GripperError> {
        ActuatorChannel::move_to(self, command)
    }

    fn wait_for_position(&self, timeout: Duration) -> Result<GripperStatus, GripperError> {
        ActuatorChannel::wait_for_position(self, timeout)
    }
}

impl<T: GripperLink + ?Sized> GripperLink for &T {
    fn move_to(&self, command: GripperCommand) -> Result<GripperCommand, GripperError> {
        (**self).move_to(command)
    }

    fn wait_for_position(&self, timeout: Duration) -> Result<GripperStatus, GripperError> {
        (**self).wait_for_position(timeout)
    }
}

impl<T: GripperLink + ?Sized> GripperLink for Arc<T> {
    fn move_to(&self, command: GripperCommand) -> Result<GripperCommand, GripperError> {
        (**self).move_to(command)
    }

    fn wait_for_position(&self, timeout: Duration) -> Result<GripperStatus, GripperError> {
        (**self).wait_for_position(timeout)
    }
}
