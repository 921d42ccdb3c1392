//! The heap: a cell pool addressed through a handle pool, with a
//! mark-compact collector.
//!
//! Handles are indices and stay stable across collection; only a handle's
//! offset into the pool moves. References therefore survive compaction
//! untouched, which is the point of the indirection.

use super::value::{ProcVal, RowVal, Target, Value};
use crate::modes::Moid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandleState {
    Free,
    Live,
}

#[derive(Clone, Debug)]
pub struct Handle {
    state: HandleState,
    offset: usize,
    len: usize,
    moid: Moid,
    marked: bool,
}

pub struct Heap {
    pool: Vec<Value>,
    handles: Vec<Handle>,
    free_handles: Vec<usize>,
    pub max_cells: usize,
    pub max_handles: usize,
    collections: usize,
}

#[derive(Debug)]
pub enum HeapError {
    OutOfCells,
    OutOfHandles,
}

impl Heap {
    pub fn new(max_cells: usize, max_handles: usize) -> Self {
        Heap {
            pool: Vec::new(),
            handles: Vec::new(),
            free_handles: Vec::new(),
            max_cells,
            max_handles,
            collections: 0,
        }
    }

    pub fn cells_in_use(&self) -> usize {
        self.pool.len()
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    /// A collection is worthwhile before the pool hits its ceiling.
    pub fn past_high_water(&self) -> bool {
        self.pool.len() * 4 >= self.max_cells * 3
    }

    /// Allocate a handle over `cells`. On exhaustion the cells come back so
    /// the caller can collect garbage and retry.
    pub fn alloc(
        &mut self,
        moid: Moid,
        cells: Vec<Value>,
    ) -> Result<usize, (HeapError, Vec<Value>)> {
        if self.pool.len() + cells.len() > self.max_cells {
            return Err((HeapError::OutOfCells, cells));
        }
        let handle = match self.free_handles.pop() {
            Some(h) => h,
            None => {
                if self.handles.len() >= self.max_handles {
                    return Err((HeapError::OutOfHandles, cells));
                }
                self.handles.push(Handle {
                    state: HandleState::Free,
                    offset: 0,
                    len: 0,
                    moid: Moid::VOID,
                    marked: false,
                });
                self.handles.len() - 1
            }
        };
        let h = &mut self.handles[handle];
        h.state = HandleState::Live;
        h.offset = self.pool.len();
        h.len = cells.len();
        h.moid = moid;
        h.marked = false;
        self.pool.extend(cells);
        Ok(handle)
    }

    pub fn get(&self, handle: usize, index: usize) -> Option<&Value> {
        let h = self.handles.get(handle)?;
        if h.state != HandleState::Live || index >= h.len {
            return None;
        }
        self.pool.get(h.offset + index)
    }

    pub fn get_mut(&mut self, handle: usize, index: usize) -> Option<&mut Value> {
        let h = self.handles.get(handle)?;
        if h.state != HandleState::Live || index >= h.len {
            return None;
        }
        let at = h.offset + index;
        self.pool.get_mut(at)
    }

    pub fn set(&mut self, handle: usize, index: usize, value: Value) -> bool {
        let h = match self.handles.get(handle) {
            Some(h) if h.state == HandleState::Live && index < h.len => h,
            _ => return false,
        };
        let at = h.offset + index;
        self.pool[at] = value;
        true
    }

    pub fn len_of(&self, handle: usize) -> usize {
        self.handles
            .get(handle)
            .map(|h| if h.state == HandleState::Live { h.len } else { 0 })
            .unwrap_or(0)
    }

    /// Mark-compact over the handle pool. `roots` is every value reachable
    /// from the frame stack and the expression stack.
    pub fn collect<'r>(&mut self, roots: impl Iterator<Item = &'r Value>) {
        self.collections += 1;
        for h in &mut self.handles {
            h.marked = false;
        }
        // Mark.
        let mut worklist: Vec<usize> = Vec::new();
        for v in roots {
            scan_value(v, &mut worklist);
        }
        while let Some(handle) = worklist.pop() {
            let h = &mut self.handles[handle];
            if h.state != HandleState::Live || h.marked {
                continue;
            }
            h.marked = true;
            let (offset, len) = (h.offset, h.len);
            for i in 0..len {
                let cell = self.pool[offset + i].clone();
                scan_value(&cell, &mut worklist);
            }
        }
        // Compact: slide live extents down, updating handle offsets.
        let mut new_pool: Vec<Value> = Vec::with_capacity(self.pool.len());
        for (i, h) in self.handles.iter_mut().enumerate() {
            if h.state != HandleState::Live {
                continue;
            }
            if !h.marked {
                h.state = HandleState::Free;
                h.len = 0;
                self.free_handles.push(i);
                continue;
            }
            let new_offset = new_pool.len();
            for k in 0..h.len {
                new_pool.push(std::mem::replace(&mut self.pool[h.offset + k], Value::Void));
            }
            h.offset = new_offset;
        }
        self.pool = new_pool;
    }
}

/// Push the handles a value refers to.
fn scan_value(v: &Value, worklist: &mut Vec<usize>) {
    match v {
        Value::Row(RowVal { handle, .. }) => worklist.push(*handle),
        Value::Ref(r) => {
            if let Target::Heap { handle, .. } = r.target {
                worklist.push(handle);
            }
        }
        Value::Struct(fields) => {
            for f in fields {
                scan_value(f, worklist);
            }
        }
        Value::United { value, .. } => scan_value(value, worklist),
        Value::Proc(ProcVal { partial, .. }) => {
            for p in partial.iter().flatten() {
                scan_value(p, worklist);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genie::value::RefVal;

    fn row_over(heap: &mut Heap, values: Vec<Value>) -> Value {
        let n = values.len() as i64;
        let handle = heap.alloc(Moid::ROW_CHAR, values).expect("alloc");
        Value::Row(RowVal::fresh(handle, &[(1, n)]))
    }

    #[test]
    fn alloc_get_set_round_trip() {
        let mut heap = Heap::new(64, 16);
        let h = heap.alloc(Moid::INT, vec![Value::Int(7)]).unwrap();
        assert!(matches!(heap.get(h, 0), Some(Value::Int(7))));
        assert!(heap.set(h, 0, Value::Int(9)));
        assert!(matches!(heap.get(h, 0), Some(Value::Int(9))));
        assert!(!heap.set(h, 1, Value::Int(0)));
    }

    #[test]
    fn collect_frees_unreachable_handles() {
        let mut heap = Heap::new(64, 16);
        let live = row_over(&mut heap, vec![Value::Char('a'), Value::Char('b')]);
        let _dead = row_over(&mut heap, vec![Value::Char('x')]);
        assert_eq!(heap.cells_in_use(), 3);
        let roots = [live.clone()];
        heap.collect(roots.iter());
        assert_eq!(heap.cells_in_use(), 2);
        // The live row still reads back unchanged.
        if let Value::Row(r) = &live {
            assert!(matches!(heap.get(r.handle, 0), Some(Value::Char('a'))));
            assert!(matches!(heap.get(r.handle, 1), Some(Value::Char('b'))));
        } else {
            panic!("expected a row");
        }
    }

    #[test]
    fn compaction_preserves_values_behind_moved_handles() {
        let mut heap = Heap::new(64, 16);
        let _dead = row_over(&mut heap, vec![Value::Int(0); 8]);
        let live = row_over(&mut heap, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        heap.collect([live.clone()].iter());
        // The live handle slid down but its contents are intact.
        if let Value::Row(r) = &live {
            let vals: Vec<i64> = (0..3)
                .map(|i| match heap.get(r.handle, i) {
                    Some(Value::Int(v)) => *v,
                    other => panic!("bad cell {:?}", other),
                })
                .collect();
            assert_eq!(vals, vec![1, 2, 3]);
        }
        assert_eq!(heap.cells_in_use(), 3);
    }

    #[test]
    fn freed_handles_are_reused() {
        let mut heap = Heap::new(64, 4);
        let _a = heap.alloc(Moid::INT, vec![Value::Int(1)]).unwrap();
        let b = heap.alloc(Moid::INT, vec![Value::Int(2)]).unwrap();
        heap.collect(std::iter::empty());
        let c = heap.alloc(Moid::INT, vec![Value::Int(3)]).unwrap();
        // One of the freed handles came back.
        assert!(c == b || c < 2);
    }

    #[test]
    fn references_through_handles_survive_collection() {
        let mut heap = Heap::new(64, 16);
        let _dead = row_over(&mut heap, vec![Value::Int(0); 4]);
        let h = heap.alloc(Moid::INT, vec![Value::Int(42)]).unwrap();
        let name = Value::Ref(RefVal {
            scope: 0,
            target: Target::Heap {
                handle: h,
                index: 0,
                path: vec![],
            },
        });
        heap.collect([name.clone()].iter());
        assert!(matches!(heap.get(h, 0), Some(Value::Int(42))));
    }

    #[test]
    fn alloc_fails_beyond_the_cell_ceiling() {
        let mut heap = Heap::new(4, 16);
        assert!(heap.alloc(Moid::INT, vec![Value::Int(0); 4]).is_ok());
        assert!(matches!(
            heap.alloc(Moid::INT, vec![Value::Int(0)]),
            Err((HeapError::OutOfCells, _))
        ));
    }
}
