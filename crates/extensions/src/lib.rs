//! The shipped syntax packs: similarity search over vectors and a small
//! spatial pack with points and circles. Both demonstrate the full
//! extension surface: lexer symbols, clause keywords, clause hooks,
//! predicate parsers, literal types, and operator resolvers/executors.

mod shared;
pub mod simsearch;
pub mod spatial;
#[cfg(test)]
mod tests;

pub use simsearch::{Metric, SimSearchPack, VectorValue};
pub use spatial::{CircleValue, PointValue, SpatialPack};

use common::EngineResult;
use syntax::SyntaxRegistry;

/// Install both shipped packs.
pub fn register_defaults(registry: &mut SyntaxRegistry) -> EngineResult<()> {
    registry.install(&SimSearchPack)?;
    registry.install(&SpatialPack)?;
    Ok(())
}
