pub mod intent;
pub mod language;
pub(crate) mod lexicon;
pub mod normalize;
pub mod parser;
pub mod slots;
pub mod types;

pub use parser::EventParser;
pub use types::{Intent, Language, ParseRequest, ParseResponse, ParsedEvent, Slot, SlotKind};
