#![allow(non_snake_case)]

mod engine;
mod midi_importer;
mod model;
mod util;

#[doc(hidden)]
pub mod test_fixture;

pub use engine::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::pitch::*;
pub use model::scales::*;
pub use model::song::*;
pub use util::*;
