use std::collections::HashMap;

use super::Value;
use super::fault::Fault;

/// Identifier of a heap object. Shared by the struct and array tables.
pub type ObjectId = i64;

/// Id handed out by the first allocation of a fresh heap.
pub const FIRST_OBJECT_ID: ObjectId = 2023;

// =============================================================================
// Heap
// =============================================================================
//
// Three tables keyed by object id:
//
// - structs: id -> field name -> value
// - arrays:  id -> flat element storage (1D and 2D)
// - strides: id -> column count, only for 2D arrays
//
// Entries are never freed and ids are never reused.

/// Object storage for one VM run.
#[derive(Debug)]
pub struct Heap {
    next_id: ObjectId,
    structs: HashMap<ObjectId, HashMap<String, Value>>,
    arrays: HashMap<ObjectId, Vec<Value>>,
    strides: HashMap<ObjectId, usize>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_OBJECT_ID,
            structs: HashMap::new(),
            arrays: HashMap::new(),
            strides: HashMap::new(),
        }
    }

    fn fresh_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of objects allocated so far.
    pub fn object_count(&self) -> usize {
        self.structs.len() + self.arrays.len()
    }

    // ---------------------------------------------------------------------
    // Structs
    // ---------------------------------------------------------------------

    pub fn alloc_struct(&mut self) -> ObjectId {
        let id = self.fresh_id();
        self.structs.insert(id, HashMap::new());
        id
    }

    fn struct_mut(&mut self, id: ObjectId) -> Result<&mut HashMap<String, Value>, Fault> {
        self.structs
            .get_mut(&id)
            .ok_or_else(|| Fault::operand(format!("no struct with id {}", id)))
    }

    /// Add `field` to a struct, initialised to null.
    pub fn add_field(&mut self, id: ObjectId, field: &str) -> Result<(), Fault> {
        self.struct_mut(id)?.insert(field.to_string(), Value::Null);
        Ok(())
    }

    pub fn set_field(&mut self, id: ObjectId, field: &str, value: Value) -> Result<(), Fault> {
        self.struct_mut(id)?.insert(field.to_string(), value);
        Ok(())
    }

    pub fn get_field(&self, id: ObjectId, field: &str) -> Result<Value, Fault> {
        let fields = self
            .structs
            .get(&id)
            .ok_or_else(|| Fault::operand(format!("no struct with id {}", id)))?;
        fields
            .get(field)
            .cloned()
            .ok_or_else(|| Fault::operand(format!("struct {} has no field '{}'", id, field)))
    }

    // ---------------------------------------------------------------------
    // Arrays
    // ---------------------------------------------------------------------

    /// Allocate a flat array of `length` copies of `fill`.
    pub fn alloc_array(&mut self, length: i64, fill: Value) -> Result<ObjectId, Fault> {
        if length < 0 {
            return Err(Fault::out_of_bounds(format!(
                "negative array length {}",
                length
            )));
        }
        let elements = filled(length as usize, fill)?;
        let id = self.fresh_id();
        self.arrays.insert(id, elements);
        Ok(id)
    }

    /// Allocate a `rows` x `columns` array and record its column stride.
    pub fn alloc_array_2d(
        &mut self,
        rows: i64,
        columns: i64,
        fill: Value,
    ) -> Result<ObjectId, Fault> {
        if rows < 0 || columns < 0 {
            return Err(Fault::out_of_bounds(format!(
                "negative 2D array dimensions {}x{}",
                rows, columns
            )));
        }
        let length = rows.checked_mul(columns).ok_or_else(|| {
            Fault::out_of_bounds(format!("2D array dimensions {}x{} too large", rows, columns))
        })?;
        let elements = filled(length as usize, fill)?;
        let id = self.fresh_id();
        self.arrays.insert(id, elements);
        self.strides.insert(id, columns as usize);
        Ok(id)
    }

    fn array(&self, id: ObjectId) -> Result<&Vec<Value>, Fault> {
        self.arrays
            .get(&id)
            .ok_or_else(|| Fault::operand(format!("no array with id {}", id)))
    }

    fn array_mut(&mut self, id: ObjectId) -> Result<&mut Vec<Value>, Fault> {
        self.arrays
            .get_mut(&id)
            .ok_or_else(|| Fault::operand(format!("no array with id {}", id)))
    }

    /// Flat element count; rows * columns for a 2D array.
    pub fn array_len(&self, id: ObjectId) -> Result<usize, Fault> {
        Ok(self.array(id)?.len())
    }

    /// Column count of a 2D array, `None` for flat arrays.
    fn stride(&self, id: ObjectId) -> Option<usize> {
        self.strides.get(&id).copied()
    }

    fn check_index(len: usize, index: i64) -> Result<usize, Fault> {
        if index < 0 || index as usize >= len {
            return Err(Fault::out_of_bounds("out-of-bounds array index"));
        }
        Ok(index as usize)
    }

    pub fn get_index(&self, id: ObjectId, index: i64) -> Result<Value, Fault> {
        let elements = self.array(id)?;
        let i = Self::check_index(elements.len(), index)?;
        Ok(elements[i].clone())
    }

    pub fn set_index(&mut self, id: ObjectId, index: i64, value: Value) -> Result<(), Fault> {
        let elements = self.array_mut(id)?;
        let i = Self::check_index(elements.len(), index)?;
        elements[i] = value;
        Ok(())
    }

    /// Translate (row, column) into a flat offset, rejecting anything that
    /// would wrap into a neighbouring row.
    fn flat_index_2d(&self, id: ObjectId, row: i64, column: i64) -> Result<usize, Fault> {
        let len = self.array(id)?.len();
        let stride = self
            .stride(id)
            .ok_or_else(|| Fault::operand(format!("array {} is not two-dimensional", id)))?;
        let out_of_bounds = || {
            Fault::out_of_bounds(format!(
                "out-of-bounds 2D array index [{}][{}] (column stride {})",
                row, column, stride
            ))
        };
        if row < 0 || column < 0 || column as usize >= stride {
            return Err(out_of_bounds());
        }
        let flat = (row as usize)
            .checked_mul(stride)
            .and_then(|offset| offset.checked_add(column as usize))
            .ok_or_else(out_of_bounds)?;
        if flat >= len {
            return Err(out_of_bounds());
        }
        Ok(flat)
    }

    pub fn get_index_2d(&self, id: ObjectId, row: i64, column: i64) -> Result<Value, Fault> {
        let flat = self.flat_index_2d(id, row, column)?;
        Ok(self.array(id)?[flat].clone())
    }

    pub fn set_index_2d(
        &mut self,
        id: ObjectId,
        row: i64,
        column: i64,
        value: Value,
    ) -> Result<(), Fault> {
        let flat = self.flat_index_2d(id, row, column)?;
        self.array_mut(id)?[flat] = value;
        Ok(())
    }
}

/// `length` copies of `fill`; a length the allocator cannot satisfy is a fault.
fn filled(length: usize, fill: Value) -> Result<Vec<Value>, Fault> {
    let mut elements = Vec::new();
    elements.try_reserve_exact(length).map_err(|_| {
        Fault::out_of_bounds(format!("cannot allocate array of {} elements", length))
    })?;
    elements.resize(length, fill);
    Ok(elements)
}
