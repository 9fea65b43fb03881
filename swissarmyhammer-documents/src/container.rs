//! Change-propagating list and map proxies.
//!
//! A list or map stored in a document field is a [`List`] or [`Map`]: a shared
//! handle to the elements plus the set of `(document, field)` owners holding
//! it. Every mutating operation links the inserted element under those
//! owners and then tells each owner that its field changed, so
//! `doc.get("tags")?.as_list().push(..)` marks `tags` dirty without
//! reassigning it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{DocumentError, Result};
use crate::field::Field;
use crate::links::{self, OwnerLinks};
use crate::pipeline::BASELINE;
use crate::value::{Record, Value};

struct ListState {
    items: Vec<Value>,
    links: OwnerLinks,
    element: Option<Field>,
}

/// An ordered sequence that notifies its owners on mutation.
#[derive(Clone)]
pub struct List {
    inner: Rc<RefCell<ListState>>,
}

impl List {
    /// An empty list with no owners.
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Snapshot of the elements. Documents and nested containers stay shared.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    /// Whether both handles point at the same list.
    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of `(document, field)` pairs this list is linked under.
    pub fn owner_count(&self) -> usize {
        self.inner.borrow().links.owners().len()
    }

    /// Replace the element at `index`.
    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        self.check_index(index, self.len())?;
        let value = self.adopt(value)?;
        self.inner.borrow_mut().items[index] = value;
        self.changed();
        Ok(())
    }

    /// Delete and return the element at `index`.
    pub fn remove(&self, index: usize) -> Result<Value> {
        self.check_index(index, self.len())?;
        let removed = self.inner.borrow_mut().items.remove(index);
        self.changed();
        Ok(removed)
    }

    /// Insert before `index`; `index == len()` appends.
    pub fn insert(&self, index: usize, value: Value) -> Result<()> {
        self.check_index(index, self.len() + 1)?;
        let value = self.adopt(value)?;
        self.inner.borrow_mut().items.insert(index, value);
        self.changed();
        Ok(())
    }

    pub fn push(&self, value: Value) -> Result<()> {
        let value = self.adopt(value)?;
        self.inner.borrow_mut().items.push(value);
        self.changed();
        Ok(())
    }

    /// Append every value. Nothing is inserted if any value is rejected.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> Result<()> {
        let adopted = values
            .into_iter()
            .map(|v| self.adopt(v))
            .collect::<Result<Vec<_>>>()?;
        self.inner.borrow_mut().items.extend(adopted);
        self.changed();
        Ok(())
    }

    /// Remove and return the last element. An empty list is left untouched.
    pub fn pop(&self) -> Option<Value> {
        let popped = self.inner.borrow_mut().items.pop();
        if popped.is_some() {
            self.changed();
        }
        popped
    }

    /// Concatenate into a new, unowned list.
    ///
    /// The appended values are still linked under this list's owners and the
    /// owners are notified, the same as the in-place operations.
    pub fn concat(&self, other: impl IntoIterator<Item = Value>) -> Result<List> {
        let mut items = self.to_vec();
        for value in other {
            items.push(self.adopt(value)?);
        }
        self.changed();
        Ok(List::from(items))
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().items.clear();
        self.changed();
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn links(&self) -> OwnerLinks {
        self.inner.borrow().links.clone()
    }

    pub(crate) fn union_links(&self, links: &OwnerLinks) {
        self.inner.borrow_mut().links.union(links);
    }

    /// Fresh proxy for a field: converted elements, no owners yet.
    pub(crate) fn for_field(items: Vec<Value>, element: &Field) -> List {
        let list = List::from(items);
        list.inner.borrow_mut().element = Some(element.clone());
        list
    }

    fn adopt(&self, value: Value) -> Result<Value> {
        let (links, element) = {
            let state = self.inner.borrow();
            (state.links.clone(), state.element.clone())
        };
        let value = match element {
            Some(field) => field.convert(value, BASELINE)?,
            None => value,
        };
        links::attach(&value, &links, Some(self.addr()), "list element")?;
        Ok(value)
    }

    fn changed(&self) {
        let links = self.links();
        links::notify(&links);
    }

    fn check_index(&self, index: usize, bound: usize) -> Result<()> {
        if index < bound {
            Ok(())
        } else {
            Err(DocumentError::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ListState {
                items,
                links: OwnerLinks::default(),
                element: None,
            })),
        }
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.inner.borrow().items == other.inner.borrow().items
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.borrow().items.iter()).finish()
    }
}

struct MapState {
    items: IndexMap<String, Value>,
    links: OwnerLinks,
    element: Option<Field>,
}

/// A string-keyed mapping that notifies its owners on mutation.
#[derive(Clone)]
pub struct Map {
    inner: Rc<RefCell<MapState>>,
}

impl Map {
    pub fn new() -> Self {
        Self::from(Record::new())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().items.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().items.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().items.keys().cloned().collect()
    }

    /// Snapshot of the entries in insertion order.
    pub fn to_record(&self) -> Record {
        self.inner.borrow().items.clone()
    }

    pub fn ptr_eq(&self, other: &Map) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn owner_count(&self) -> usize {
        self.inner.borrow().links.owners().len()
    }

    /// Insert or replace; returns the previous value for `key`.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Result<Option<Value>> {
        let value = self.adopt(value)?;
        let previous = self.inner.borrow_mut().items.insert(key.into(), value);
        self.changed();
        Ok(previous)
    }

    /// Remove `key`. Owners are only notified when something was removed.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.borrow_mut().items.shift_remove(key);
        if removed.is_some() {
            self.changed();
        }
        removed
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = (String, Value)>) -> Result<()> {
        let adopted = entries
            .into_iter()
            .map(|(k, v)| self.adopt(v).map(|v| (k, v)))
            .collect::<Result<Vec<_>>>()?;
        self.inner.borrow_mut().items.extend(adopted);
        self.changed();
        Ok(())
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().items.clear();
        self.changed();
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn links(&self) -> OwnerLinks {
        self.inner.borrow().links.clone()
    }

    pub(crate) fn union_links(&self, links: &OwnerLinks) {
        self.inner.borrow_mut().links.union(links);
    }

    pub(crate) fn for_field(items: Record, element: &Field) -> Map {
        let map = Map::from(items);
        map.inner.borrow_mut().element = Some(element.clone());
        map
    }

    fn adopt(&self, value: Value) -> Result<Value> {
        let (links, element) = {
            let state = self.inner.borrow();
            (state.links.clone(), state.element.clone())
        };
        let value = match element {
            Some(field) => field.convert(value, BASELINE)?,
            None => value,
        };
        links::attach(&value, &links, Some(self.addr()), "map entry")?;
        Ok(value)
    }

    fn changed(&self) {
        let links = self.links();
        links::notify(&links);
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Record> for Map {
    fn from(items: Record) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MapState {
                items,
                links: OwnerLinks::default(),
                element: None,
            })),
        }
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Record>())
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.inner.borrow().items == other.inner.borrow().items
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.borrow().items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::schema::Schema;

    fn owner_with_list() -> (Document, List) {
        let schema = Schema::builder("Owner")
            .field("items", Field::list(Field::integer()).unwrap())
            .build()
            .unwrap();
        let doc = Document::new(&schema);
        let list = doc.get("items").unwrap().as_list().unwrap().clone();
        (doc, list)
    }

    #[test]
    fn every_mutation_marks_the_owner() {
        type Op = fn(&List);
        let ops: Vec<(&str, Op)> = vec![
            ("push", |l| l.push(Value::from(9)).unwrap()),
            ("insert", |l| l.insert(0, Value::from(9)).unwrap()),
            ("set", |l| l.set(0, Value::from(9)).unwrap()),
            ("remove", |l| {
                l.remove(0).unwrap();
            }),
            ("pop", |l| {
                l.pop();
            }),
            ("extend", |l| l.extend(vec![Value::from(1)]).unwrap()),
            ("concat", |l| {
                l.concat(vec![Value::from(1)]).unwrap();
            }),
            ("clear", |l| l.clear()),
        ];
        for (name, op) in ops {
            let (doc, list) = owner_with_list();
            list.inner.borrow_mut().items.push(Value::from(1));
            assert!(doc.modified_fields().is_empty(), "{name}");
            op(&list);
            assert!(doc.modified_fields().contains("items"), "{name}");
        }
    }

    #[test]
    fn pop_on_empty_list_is_not_a_change() {
        let (doc, list) = owner_with_list();
        assert_eq!(list.pop(), None);
        assert!(doc.modified_fields().is_empty());
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let (_doc, list) = owner_with_list();
        assert!(matches!(
            list.set(3, Value::from(1)),
            Err(DocumentError::IndexOutOfRange { index: 3, len: 0 })
        ));
        assert!(list.insert(0, Value::from(1)).is_ok());
        assert!(list.remove(1).is_err());
    }

    #[test]
    fn concat_leaves_the_original_unchanged() {
        let (_doc, list) = owner_with_list();
        list.push(Value::from(1)).unwrap();
        let joined = list.concat(vec![Value::from(2)]).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(joined.to_vec(), vec![Value::from(1), Value::from(2)]);
        assert_eq!(joined.owner_count(), 0);
    }

    #[test]
    fn list_cannot_contain_itself() {
        let list = List::new();
        let err = list.push(Value::List(list.clone())).unwrap_err();
        assert!(matches!(err, DocumentError::CyclicOwnership { .. }));
        assert!(list.is_empty());
    }

    #[test]
    fn nested_list_reaches_top_level_owner() {
        let schema = Schema::builder("Grid")
            .field(
                "rows",
                Field::list(Field::list(Field::integer()).unwrap()).unwrap(),
            )
            .build()
            .unwrap();
        let doc = Document::new(&schema);
        let rows = doc.get("rows").unwrap().as_list().unwrap().clone();
        rows.push(Value::from(vec![Value::from(1)])).unwrap();

        let fresh = Document::from_record(&schema, doc.export("record", Default::default()).unwrap())
            .unwrap();
        assert!(fresh.modified_fields().is_empty());
        let row = fresh.get("rows").unwrap().as_list().unwrap().get(0).unwrap();
        row.as_list().unwrap().push(Value::from(2)).unwrap();
        assert_eq!(
            fresh.modified_fields().into_iter().collect::<Vec<_>>(),
            vec!["rows".to_string()]
        );
    }

    #[test]
    fn map_mutations_mark_the_owner() {
        let schema = Schema::builder("Settings")
            .field(
                "flags",
                Field::map(Field::string(), Field::boolean()).unwrap(),
            )
            .build()
            .unwrap();
        let doc = Document::new(&schema);
        let flags = doc.get("flags").unwrap().as_map().unwrap().clone();
        assert_eq!(flags.remove("missing"), None);
        assert!(doc.modified_fields().is_empty());

        flags.insert("dark", Value::from(true)).unwrap();
        assert!(doc.modified_fields().contains("flags"));
        assert_eq!(flags.keys(), vec!["dark".to_string()]);
    }
}
