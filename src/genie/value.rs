//! Runtime values.
//!
//! Rows live behind handles in the heap; a [`RowVal`] is a descriptor with
//! bounds and strides, so trims alias the same handle. References address
//! either a frame slot or a heap cell, with a field path for names of
//! struct fields, and carry the dynamic scope that must outlive them.

use crate::ast::NodeId;
use crate::modes::Moid;

#[derive(Clone, Debug)]
pub enum Value {
    Void,
    Int(i64),
    Real(f64),
    Bool(bool),
    Char(char),
    Bits(u64),
    Complex(f64, f64),
    Row(RowVal),
    Struct(Vec<Value>),
    United { tag: Moid, value: Box<Value> },
    Ref(RefVal),
    Proc(ProcVal),
    Nil,
}

/// One dimension of a row descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dim {
    pub lower: i64,
    pub upper: i64,
    pub stride: usize,
}

impl Dim {
    pub fn count(&self) -> usize {
        if self.upper < self.lower {
            0
        } else {
            (self.upper - self.lower + 1) as usize
        }
    }
}

/// Row descriptor: bounds plus a view into a heap handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowVal {
    pub handle: usize,
    pub base: usize,
    pub dims: Vec<Dim>,
}

impl RowVal {
    /// Row-major descriptor over a fresh handle.
    pub fn fresh(handle: usize, bounds: &[(i64, i64)]) -> RowVal {
        let mut dims: Vec<Dim> = bounds
            .iter()
            .map(|&(lower, upper)| Dim {
                lower,
                upper,
                stride: 0,
            })
            .collect();
        let mut stride = 1;
        for d in dims.iter_mut().rev() {
            d.stride = stride;
            stride *= d.count().max(0);
        }
        RowVal {
            handle,
            base: 0,
            dims,
        }
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|d| d.count()).product()
    }

    /// Flat cell index of a full subscript, if in bounds.
    pub fn locate(&self, subscripts: &[i64]) -> Option<usize> {
        if subscripts.len() != self.dims.len() {
            return None;
        }
        let mut flat = self.base;
        for (d, &s) in self.dims.iter().zip(subscripts.iter()) {
            if s < d.lower || s > d.upper {
                return None;
            }
            flat += (s - d.lower) as usize * d.stride;
        }
        Some(flat)
    }

    /// All flat indices in row-major order.
    pub fn iter_flat(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.element_count());
        let mut idx: Vec<i64> = self.dims.iter().map(|d| d.lower).collect();
        if self.dims.iter().any(|d| d.count() == 0) {
            return out;
        }
        loop {
            out.push(self.locate(&idx).expect("index within bounds"));
            let mut k = self.dims.len();
            loop {
                if k == 0 {
                    return out;
                }
                k -= 1;
                idx[k] += 1;
                if idx[k] <= self.dims[k].upper {
                    break;
                }
                idx[k] = self.dims[k].lower;
            }
        }
    }
}

/// Where a name points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Frame {
        frame: usize,
        offset: usize,
        path: Vec<usize>,
    },
    Heap {
        handle: usize,
        index: usize,
        path: Vec<usize>,
    },
    /// A name referring to a trimmed view of a multiple; stores write
    /// through the shared handle.
    Trim { row: Box<RowVal> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefVal {
    /// Frame depth that must outlive this name; 0 is primal (heap).
    pub scope: u32,
    pub target: Target,
}

#[derive(Clone, Debug)]
pub enum ProcKind {
    /// A routine text closed over the frame at its creation.
    Routine { node: NodeId, env_frame: usize },
    /// A standard-prelude implementation.
    Std(usize),
}

#[derive(Clone, Debug)]
pub struct ProcVal {
    pub kind: ProcKind,
    pub moid: Moid,
    /// Partially applied arguments, aligned with the full parameter pack.
    pub partial: Vec<Option<Value>>,
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "VOID",
            Value::Int(_) => "INT",
            Value::Real(_) => "REAL",
            Value::Bool(_) => "BOOL",
            Value::Char(_) => "CHAR",
            Value::Bits(_) => "BITS",
            Value::Complex(..) => "COMPL",
            Value::Row(_) => "rows",
            Value::Struct(_) => "structure",
            Value::United { .. } => "united value",
            Value::Ref(_) => "name",
            Value::Proc(_) => "routine",
            Value::Nil => "NIL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_descriptor_is_row_major() {
        let r = RowVal::fresh(0, &[(1, 2), (1, 3)]);
        assert_eq!(r.element_count(), 6);
        assert_eq!(r.locate(&[1, 1]), Some(0));
        assert_eq!(r.locate(&[1, 3]), Some(2));
        assert_eq!(r.locate(&[2, 1]), Some(3));
        assert_eq!(r.locate(&[2, 3]), Some(5));
    }

    #[test]
    fn locate_rejects_out_of_bounds() {
        let r = RowVal::fresh(0, &[(1, 3)]);
        assert_eq!(r.locate(&[0]), None);
        assert_eq!(r.locate(&[4]), None);
        assert_eq!(r.locate(&[2]), Some(1));
    }

    #[test]
    fn empty_row_has_no_elements() {
        let r = RowVal::fresh(0, &[(1, 0)]);
        assert_eq!(r.element_count(), 0);
        assert!(r.iter_flat().is_empty());
    }

    #[test]
    fn iter_flat_visits_in_row_major_order() {
        let r = RowVal::fresh(0, &[(0, 1), (5, 6)]);
        assert_eq!(r.iter_flat(), vec![0, 1, 2, 3]);
    }
}
