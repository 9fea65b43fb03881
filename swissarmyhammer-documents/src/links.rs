//! Owner backlinks and upward change propagation.
//!
//! Every document, list and map carries a set of `(owner, field)` links back
//! to the documents that hold it. Links are `Weak`: they never keep an owner
//! alive. A mutation anywhere marks the linked field dirty on each owner and
//! keeps climbing through the owners' own links, so a change at any depth is
//! visible at the top.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::document::{Document, DocumentState};
use crate::error::{DocumentError, Result};
use crate::value::Value;

#[derive(Clone)]
struct OwnerLink {
    owner: Weak<RefCell<DocumentState>>,
    field: String,
}

impl OwnerLink {
    fn same_as(&self, other: &OwnerLink) -> bool {
        self.field == other.field && Weak::ptr_eq(&self.owner, &other.owner)
    }
}

/// The set of `(owner, field)` pairs a value is reachable from.
#[derive(Clone, Default)]
pub(crate) struct OwnerLinks {
    links: Vec<OwnerLink>,
}

impl OwnerLinks {
    /// A link set naming exactly one owning field.
    pub(crate) fn single(owner: &Document, field: &str) -> Self {
        Self {
            links: vec![OwnerLink {
                owner: Rc::downgrade(&owner.state),
                field: field.to_string(),
            }],
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    /// Add every link from `other` not already present. Dead owners are dropped.
    pub(crate) fn union(&mut self, other: &OwnerLinks) {
        self.links.retain(|l| l.owner.strong_count() > 0);
        for link in &other.links {
            if link.owner.strong_count() == 0 {
                continue;
            }
            if !self.links.iter().any(|l| l.same_as(link)) {
                self.links.push(link.clone());
            }
        }
    }

    /// Live owners with the field each one holds us under.
    pub(crate) fn owners(&self) -> Vec<(Document, String)> {
        self.links
            .iter()
            .filter_map(|l| {
                l.owner
                    .upgrade()
                    .map(|state| (Document { state }, l.field.clone()))
            })
            .collect()
    }

    fn owner_addrs(&self) -> Vec<usize> {
        self.links
            .iter()
            .filter(|l| l.owner.strong_count() > 0)
            .map(|l| l.owner.as_ptr() as *const () as usize)
            .collect()
    }

    fn first_field(&self) -> Option<&str> {
        self.links.first().map(|l| l.field.as_str())
    }
}

/// Mark `field` dirty on `doc`, drop its cached validity and climb to its owners.
pub(crate) fn mark_changed(doc: &Document, field: &str) {
    let mut seen = HashSet::new();
    propagate_change(doc, field, &mut seen);
}

/// Tell every owner in `links` that the field holding us changed.
pub(crate) fn notify(links: &OwnerLinks) {
    trace!(links = links.len(), "container changed");
    let mut seen = HashSet::new();
    for (owner, field) in links.owners() {
        propagate_change(&owner, &field, &mut seen);
    }
}

fn propagate_change(doc: &Document, field: &str, seen: &mut HashSet<(usize, String)>) {
    // Shared embedding can reach the same owner twice; once is enough.
    if !seen.insert((doc.addr(), field.to_string())) {
        return;
    }
    let owners = {
        let mut state = doc.state.borrow_mut();
        state.modified.insert(field.to_string());
        state.valid = false;
        state.links.owners()
    };
    trace!(schema = %doc.schema().name(), field, owners = owners.len(), "field changed");
    for (owner, owner_field) in owners {
        propagate_change(&owner, &owner_field, seen);
    }
}

/// Drop the cached validity of `doc` and every transitive owner without
/// marking anything dirty.
pub(crate) fn invalidate(doc: &Document) {
    let mut seen = HashSet::new();
    let mut pending = vec![doc.clone()];
    while let Some(current) = pending.pop() {
        if !seen.insert(current.addr()) {
            continue;
        }
        let owners = {
            let mut state = current.state.borrow_mut();
            state.valid = false;
            state.links.owners()
        };
        pending.extend(owners.into_iter().map(|(owner, _)| owner));
    }
}

/// Link `value` under every owner in `links`.
///
/// Documents and containers union the links into their own set; containers
/// also pass them down to their elements so that documents nested inside
/// nested lists reach the top. `container` is the address of the container
/// receiving the value, if any. Fails without touching anything when the
/// value already contains one of the owners or the container itself.
pub(crate) fn attach(
    value: &Value,
    links: &OwnerLinks,
    container: Option<usize>,
    label: &str,
) -> Result<()> {
    if !matches!(value, Value::Document(_) | Value::List(_) | Value::Map(_))
        || (links.is_empty() && container.is_none())
    {
        return Ok(());
    }
    let mut targets = links.owner_addrs();
    targets.extend(container);
    if !targets.is_empty() && reaches(value, &targets, &mut HashSet::new()) {
        return Err(DocumentError::CyclicOwnership {
            field: links.first_field().unwrap_or(label).to_string(),
        });
    }
    link_into(value, links);
    Ok(())
}

fn link_into(value: &Value, links: &OwnerLinks) {
    match value {
        Value::Document(doc) => doc.state.borrow_mut().links.union(links),
        Value::List(list) => {
            list.union_links(links);
            for item in list.to_vec() {
                link_into(&item, links);
            }
        }
        Value::Map(map) => {
            map.union_links(links);
            for item in map.to_record().values() {
                link_into(item, links);
            }
        }
        _ => {}
    }
}

/// Does `value`, or anything stored beneath it, sit at one of `targets`?
fn reaches(value: &Value, targets: &[usize], visited: &mut HashSet<usize>) -> bool {
    let (addr, children) = match value {
        Value::Document(doc) => (doc.addr(), doc.stored_values().into_values().collect()),
        Value::List(list) => (list.addr(), list.to_vec()),
        Value::Map(map) => (map.addr(), map.to_record().into_values().collect()),
        _ => return false,
    };
    if targets.contains(&addr) {
        return true;
    }
    if !visited.insert(addr) {
        return false;
    }
    children
        .iter()
        .any(|child: &Value| reaches(child, targets, visited))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::schema::Schema;

    fn node_schema() -> Schema {
        Schema::builder("Node")
            .field("name", Field::string())
            .build()
            .unwrap()
    }

    #[test]
    fn union_is_idempotent() {
        let doc = Document::new(&node_schema());
        let mut links = OwnerLinks::single(&doc, "child");
        let same = OwnerLinks::single(&doc, "child");
        links.union(&same);
        links.union(&same);
        assert_eq!(links.len(), 1);

        links.union(&OwnerLinks::single(&doc, "other"));
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn dead_owners_are_skipped() {
        let schema = node_schema();
        let links = {
            let owner = Document::new(&schema);
            OwnerLinks::single(&owner, "child")
        };
        assert!(links.owners().is_empty());

        let mut fresh = OwnerLinks::default();
        fresh.union(&links);
        assert!(fresh.is_empty());
    }

    #[test]
    fn attach_rejects_self_link() {
        let doc = Document::new(&node_schema());
        let links = OwnerLinks::single(&doc, "child");
        let err = attach(&Value::Document(doc.clone()), &links, None, "child").unwrap_err();
        assert!(matches!(err, DocumentError::CyclicOwnership { .. }));
    }

    #[test]
    fn scalars_never_link() {
        let doc = Document::new(&node_schema());
        let links = OwnerLinks::single(&doc, "child");
        assert!(attach(&Value::Int(1), &links, None, "child").is_ok());
    }
}
