pub mod muloop;
pub mod window;

pub use muloop::{LoopExit, LoopStep, LoopTask, LoopToken, MultiLoop};
pub use window::SlidingWindow;
