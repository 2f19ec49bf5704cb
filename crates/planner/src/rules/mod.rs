//! The rules catalog.

mod filter_merge;
mod filter_push_down;
mod selection_swap;

pub use filter_merge::FilterMergeRule;
pub use filter_push_down::FilterPushDownRule;
pub use selection_swap::SelectionExtSwapRule;
