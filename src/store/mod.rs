//! Tile store: fixed-size typed tile buffers paged between memory and a
//! scratch directory under a bounded resident budget.
//!
//! Components
//! - `tile`: tile identity, paging state, and the aligned byte buffer.
//! - `store`: the store itself: allocation, scoped acquire, LRU eviction.
//!
//! Tiles are independent owned buffers keyed by id; nothing holds a
//! reference into another tile. A checked-out tile cannot be evicted, so a
//! guard's typed slices stay valid for its whole scope.

pub mod store;
pub mod tile;

pub use self::store::{TileGuard, TileStore, TileStoreOptions};
pub use self::tile::{TileHandle, TileId};
