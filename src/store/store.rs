//! Process-wide tile backing store.
//!
//! Hands out fixed-size typed tile buffers, pages them between memory and a
//! scratch directory, and enforces a cap on the number of resident tiles.
//! Eviction is LRU over tiles that are not checked out; dirty tiles are
//! flushed to their scratch file first, clean ones are simply dropped.

use std::collections::HashMap;
use std::fs;
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::PathBuf;
use std::sync::Mutex;

use log::debug;
use uuid::Uuid;

use super::tile::{element_fits, TileBuf, TileHandle, TileId, TileState};
use crate::error::{Error, Result};
use crate::image::TileElement;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct TileStoreOptions {
    /// Directory receiving one file per evicted dirty tile.
    pub scratch_dir: PathBuf,
    /// Tile width in elements.
    pub tile_width: usize,
    /// Tile height in elements.
    pub tile_height: usize,
    /// Upper bound on the byte size of a single tile.
    pub max_tile_bytes: usize,
    /// Upper bound on tiles held in memory, checked-out tiles included.
    pub max_resident_tiles: usize,
}

impl Default for TileStoreOptions {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("pano-compositer"),
            tile_width: 256,
            tile_height: 256,
            // 256x256 RGBA f32
            max_tile_bytes: 256 * 256 * 16,
            max_resident_tiles: 100,
        }
    }
}

impl TileStoreOptions {
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_tile_size(mut self, size: usize) -> Self {
        self.tile_width = size;
        self.tile_height = size;
        self.max_tile_bytes = size * size * 16;
        self
    }

    pub fn with_max_resident_tiles(mut self, cap: usize) -> Self {
        self.max_resident_tiles = cap;
        self
    }
}

struct TileSlot {
    len_bytes: usize,
    state: TileState,
    dirty: bool,
    scratch: Option<PathBuf>,
    last_use: u64,
}

struct StoreInner {
    slots: HashMap<TileId, TileSlot>,
    next_id: u64,
    tick: u64,
    /// Tiles currently in memory (resident or checked out).
    resident: usize,
}

pub struct TileStore {
    options: TileStoreOptions,
    inner: Mutex<StoreInner>,
}

impl TileStore {
    /// Create a store and its scratch directory.
    pub fn create(options: TileStoreOptions) -> Result<Self> {
        if options.tile_width == 0 || options.tile_height == 0 {
            return Err(Error::config("tile dimensions must be positive"));
        }
        if options.max_resident_tiles == 0 {
            return Err(Error::config("resident tile cap must be positive"));
        }
        fs::create_dir_all(&options.scratch_dir)
            .map_err(|e| Error::io(&options.scratch_dir, e))?;

        Ok(Self {
            options,
            inner: Mutex::new(StoreInner {
                slots: HashMap::new(),
                next_id: 0,
                tick: 0,
                resident: 0,
            }),
        })
    }

    pub fn options(&self) -> &TileStoreOptions {
        &self.options
    }

    pub fn tile_width(&self) -> usize {
        self.options.tile_width
    }

    pub fn tile_height(&self) -> usize {
        self.options.tile_height
    }

    /// Allocate a fresh tile of `w × h` elements of `T`.
    ///
    /// No memory is committed until the first acquire; the first acquire of
    /// a never-flushed tile sees zeroed bytes.
    pub fn new_tile<T: TileElement>(&self, w: usize, h: usize) -> Result<TileHandle<T>> {
        debug_assert!(element_fits::<T>());
        let len_bytes = w * h * size_of::<T>();
        if len_bytes == 0 {
            return Err(Error::config("tile must hold at least one element"));
        }
        if len_bytes > self.options.max_tile_bytes {
            return Err(Error::config(format!(
                "tile of {len_bytes} bytes exceeds the {} byte cap",
                self.options.max_tile_bytes
            )));
        }

        let mut inner = self.lock();
        let id = TileId(inner.next_id);
        inner.next_id += 1;
        inner.slots.insert(
            id,
            TileSlot {
                len_bytes,
                state: TileState::Unloaded,
                dirty: false,
                scratch: None,
                last_use: 0,
            },
        );
        Ok(TileHandle {
            id,
            _elem: PhantomData,
        })
    }

    /// Check the tile out of the store, loading it from scratch (or zeroes)
    /// if it is not resident. The tile cannot be evicted until the returned
    /// guard drops.
    pub fn acquire<T: TileElement>(&self, handle: TileHandle<T>) -> Result<TileGuard<'_, T>> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let slot = inner
            .slots
            .get_mut(&handle.id)
            .expect("tile handle does not belong to this store");
        slot.last_use = tick;

        let buf = match std::mem::replace(&mut slot.state, TileState::Acquired) {
            TileState::Acquired => {
                return Err(Error::TileAcquired {
                    id: handle.id.raw(),
                })
            }
            TileState::Resident(buf) => buf,
            TileState::Unloaded => {
                let len_bytes = slot.len_bytes;
                let scratch = slot.scratch.clone();
                match self.load_tile(&mut inner, len_bytes, scratch) {
                    Ok(buf) => {
                        inner.resident += 1;
                        buf
                    }
                    Err(e) => {
                        // undo the Acquired marking from the replace above
                        inner
                            .slots
                            .get_mut(&handle.id)
                            .expect("slot present")
                            .state = TileState::Unloaded;
                        return Err(e);
                    }
                }
            }
        };

        Ok(TileGuard {
            store: self,
            id: handle.id,
            buf: Some(buf),
            written: false,
            _elem: PhantomData,
        })
    }

    /// Evict until one more tile fits, then read the tile's bytes back from
    /// scratch, or zero-fill if it was never flushed.
    fn load_tile(
        &self,
        inner: &mut StoreInner,
        len_bytes: usize,
        scratch: Option<PathBuf>,
    ) -> Result<TileBuf> {
        self.make_room(inner)?;
        match scratch {
            Some(path) => {
                let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
                if bytes.len() != len_bytes {
                    return Err(Error::io(
                        &path,
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!(
                                "scratch file holds {} bytes, expected {len_bytes}",
                                bytes.len()
                            ),
                        ),
                    ));
                }
                Ok(TileBuf::from_bytes(&bytes))
            }
            None => Ok(TileBuf::zeroed(len_bytes)),
        }
    }

    fn release(&self, id: TileId, buf: TileBuf, written: bool) {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let slot = inner.slots.get_mut(&id).expect("released tile is known");
        slot.state = TileState::Resident(buf);
        slot.dirty |= written;
        slot.last_use = tick;
    }

    /// Evict LRU tiles until one more tile fits under the resident cap.
    fn make_room(&self, inner: &mut StoreInner) -> Result<()> {
        while inner.resident >= self.options.max_resident_tiles {
            self.evict_one(inner)?;
        }
        Ok(())
    }

    fn evict_one(&self, inner: &mut StoreInner) -> Result<()> {
        let victim = inner
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot.state, TileState::Resident(_)))
            .min_by_key(|(_, slot)| slot.last_use)
            .map(|(id, _)| *id);

        let Some(id) = victim else {
            return Err(Error::OutOfBudget {
                resident: inner.resident,
                cap: self.options.max_resident_tiles,
            });
        };

        let slot = inner.slots.get_mut(&id).expect("victim slot present");
        let TileState::Resident(buf) = std::mem::replace(&mut slot.state, TileState::Unloaded)
        else {
            unreachable!("victim was selected among resident tiles");
        };

        let flush = slot.dirty.then(|| {
            slot.dirty = false;
            slot.scratch
                .get_or_insert_with(|| {
                    self.options
                        .scratch_dir
                        .join(format!("{}.tile", Uuid::new_v4()))
                })
                .clone()
        });

        // the buffer leaves memory whether or not the flush succeeds
        inner.resident -= 1;

        if let Some(path) = flush {
            fs::write(&path, buf.as_bytes()).map_err(|e| Error::io(&path, e))?;
            debug!("flushed tile {} to {}", id.raw(), path.display());
        } else {
            debug!("discarded clean tile {}", id.raw());
        }

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("tile store mutex poisoned")
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        // best effort, and never panic during unwinding
        if let Ok(inner) = self.inner.lock() {
            for slot in inner.slots.values() {
                if let Some(path) = &slot.scratch {
                    let _ = fs::remove_file(path);
                }
            }
        }
    }
}

/// Scoped access to a checked-out tile. Dropping the guard returns the
/// buffer to the store; any mutable access marks the tile dirty.
pub struct TileGuard<'a, T: TileElement> {
    store: &'a TileStore,
    id: TileId,
    buf: Option<TileBuf>,
    written: bool,
    _elem: PhantomData<T>,
}

impl<T: TileElement> TileGuard<'_, T> {
    pub fn id(&self) -> TileId {
        self.id
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        bytemuck::cast_slice(self.buf.as_ref().expect("guard buffer present").as_bytes())
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.written = true;
        bytemuck::cast_slice_mut(
            self.buf
                .as_mut()
                .expect("guard buffer present")
                .as_bytes_mut(),
        )
    }
}

impl<T: TileElement> Drop for TileGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.store.release(self.id, buf, self.written);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(cap: usize) -> (tempfile::TempDir, TileStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = TileStoreOptions::default()
            .with_scratch_dir(dir.path())
            .with_tile_size(8)
            .with_max_resident_tiles(cap);
        let store = TileStore::create(options).expect("store");
        (dir, store)
    }

    #[test]
    fn first_acquire_is_zeroed() {
        let (_dir, store) = store(4);
        let tile = store.new_tile::<f32>(8, 8).unwrap();
        let guard = store.acquire(tile).unwrap();
        assert!(guard.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn eviction_round_trips_dirty_bytes() {
        let (_dir, store) = store(2);
        let tiles: Vec<_> = (0..4)
            .map(|i| {
                let t = store.new_tile::<f32>(8, 8).unwrap();
                store.acquire(t).unwrap().as_mut_slice().fill(i as f32);
                t
            })
            .collect();

        // all four tiles cycled through a 2-tile budget
        for (i, &t) in tiles.iter().enumerate() {
            let guard = store.acquire(t).unwrap();
            assert!(guard.as_slice().iter().all(|&v| v == i as f32));
        }
    }

    #[test]
    fn clean_reload_stays_zero() {
        let (_dir, store) = store(1);
        let a = store.new_tile::<u8>(8, 8).unwrap();
        let b = store.new_tile::<u8>(8, 8).unwrap();
        // touch a read-only, then force it out with b
        assert_eq!(store.acquire(a).unwrap().as_slice()[0], 0);
        store.acquire(b).unwrap().as_mut_slice().fill(7);
        assert_eq!(store.acquire(a).unwrap().as_slice()[0], 0);
    }

    #[test]
    fn lru_prefers_the_stalest_tile() {
        let (dir, store) = store(2);
        let a = store.new_tile::<f32>(8, 8).unwrap();
        let b = store.new_tile::<f32>(8, 8).unwrap();
        let c = store.new_tile::<f32>(8, 8).unwrap();

        store.acquire(a).unwrap().as_mut_slice().fill(1.0);
        store.acquire(b).unwrap().as_mut_slice().fill(2.0);
        // refresh a so b is the LRU victim when c loads
        store.acquire(a).unwrap();
        store.acquire(c).unwrap().as_mut_slice().fill(3.0);

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1, "only the evicted dirty tile should hit scratch");
    }

    #[test]
    fn pinned_tiles_exhaust_the_budget() {
        let (_dir, store) = store(2);
        let a = store.new_tile::<f32>(8, 8).unwrap();
        let b = store.new_tile::<f32>(8, 8).unwrap();
        let c = store.new_tile::<f32>(8, 8).unwrap();

        let _ga = store.acquire(a).unwrap();
        let _gb = store.acquire(b).unwrap();
        assert!(matches!(
            store.acquire(c),
            Err(Error::OutOfBudget { resident: 2, cap: 2 })
        ));
    }

    #[test]
    fn double_acquire_is_rejected() {
        let (_dir, store) = store(4);
        let a = store.new_tile::<f32>(8, 8).unwrap();
        let _guard = store.acquire(a).unwrap();
        assert!(matches!(store.acquire(a), Err(Error::TileAcquired { .. })));
    }

    #[test]
    fn oversized_tile_is_rejected() {
        let (_dir, store) = store(4);
        // cap is 8*8*16 bytes after with_tile_size(8)
        assert!(matches!(
            store.new_tile::<f32>(64, 64),
            Err(Error::InvalidConfiguration { .. })
        ));
    }
}
