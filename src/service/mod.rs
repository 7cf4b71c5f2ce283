//! Service layer module.
//!
//! Contains the allocation engine and the caller and administration services built
//! on it.

pub mod allocator;
pub mod batch;
pub mod clock;
pub mod identifier;
pub mod logic;
pub mod render;
pub mod repository;
pub mod reset;
pub mod token;

pub use allocator::SequenceAllocator;
pub use batch::BatchCoordinator;
pub use clock::Clock;
pub use identifier::IdentifierService;
pub use logic::LogicService;
pub use render::{Template, render};
pub use repository::LogicRepository;
pub use reset::{calendar_window, should_reset};
pub use token::build_token;
