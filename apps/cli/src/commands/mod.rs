//! 命令定义和实现

pub mod check;
pub mod gripper;
pub mod run;

pub use check::CheckCommand;
pub use gripper::GripperCommand;
pub use run::RunCommand;
