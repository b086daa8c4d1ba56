pub mod pages;

pub use pages::{basic, basic_data, counter, nested, nested_data, non_streamed_nested_data};
