#[macro_use]
pub(crate) mod trace;
#[macro_use]
pub(crate) mod macros;

pub(crate) mod clock;
pub(crate) mod error;
pub(crate) mod ids;
pub(crate) mod parser;
pub(crate) mod utils;

pub type Map<K, V> = hashbrown::HashMap<K, V, fxhash::FxBuildHasher>;
pub type Set<T> = hashbrown::HashSet<T, fxhash::FxBuildHasher>;
