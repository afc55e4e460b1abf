mod custom_event;
mod hero;
mod story;

pub use custom_event::CustomEvent;
pub use hero::Hero;
pub use story::Story;
