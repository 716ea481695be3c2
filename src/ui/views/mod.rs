mod generator_view;

pub use generator_view::{ContentMode, GeneratorState, GeneratorView};
