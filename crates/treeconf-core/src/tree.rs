//! Arena holding the nodes of one configuration tree

use std::ops::{Index, IndexMut};

use crate::node::{Content, Flag, NodeData, NodeId, NodeKind};
use crate::types::Key;
use crate::value::Value;

/// Node storage. Removed slots are reused; ids stay stable across `Clone`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tree {
    slots: Vec<Option<NodeData>>,
    free: Vec<usize>,
}

impl Tree {
    pub(crate) fn insert(&mut self, data: NodeData) -> NodeId {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(data);
                NodeId(idx)
            }
            None => {
                self.slots.push(Some(data));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Remove a node and all of its descendants
    pub(crate) fn remove(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(data) = self.slots.get_mut(next.0).and_then(Option::take) {
                pending.extend(data.child_ids());
                self.free.push(next.0);
            }
        }
    }

    /// Number of live nodes
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Effective flag value: the first locally set value walking to the root
    pub(crate) fn flag(&self, id: NodeId, flag: Flag) -> Option<bool> {
        let mut current = Some(id);
        while let Some(node) = current {
            let data = &self[node];
            if let Some(v) = data.flags.get(flag) {
                return Some(v);
            }
            current = data.parent;
        }
        None
    }

    pub(crate) fn is_readonly(&self, id: NodeId) -> bool {
        self.flag(id, Flag::Readonly) == Some(true)
    }

    /// Dotted key of a node, e.g. `servers[0].host`; empty for the root
    pub(crate) fn full_key(&self, id: NodeId) -> String {
        let mut keys = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let data = &self[node];
            if let Some(key) = &data.key {
                keys.push(key);
            }
            current = data.parent;
        }

        let mut out = String::new();
        for key in keys.into_iter().rev() {
            match key {
                Key::Index(i) => out.push_str(&format!("[{}]", i)),
                other => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(&other.to_key_string());
                }
            }
        }
        out
    }

    /// Full key of a child that may not exist yet
    pub(crate) fn child_key(&self, parent: NodeId, key: &Key) -> String {
        let base = self.full_key(parent);
        match key {
            Key::Index(i) => format!("{}[{}]", base, i),
            other if base.is_empty() => other.to_key_string(),
            other => format!("{}.{}", base, other.to_key_string()),
        }
    }

    /// Look up a direct child by an already validated key
    pub(crate) fn child(&self, parent: NodeId, key: &Key) -> Option<NodeId> {
        match (&self[parent].kind, key) {
            (NodeKind::Map(m), _) => m.content.children().and_then(|c| c.get(key).copied()),
            (NodeKind::Seq(s), Key::Index(i)) => {
                let children = s.content.children()?;
                let idx = usize::try_from(*i).ok()?;
                children.get(idx).copied()
            }
            _ => None,
        }
    }

    /// Deep-copy the subtree at `src_id` of `src` into this tree
    pub(crate) fn copy_from(
        &mut self,
        src: &Tree,
        src_id: NodeId,
        parent: Option<NodeId>,
        key: Option<Key>,
    ) -> NodeId {
        let source = &src[src_id];
        let mut data = source.clone();
        data.parent = parent;
        data.key = key;
        // children are re-linked below
        match &mut data.kind {
            NodeKind::Map(m) => {
                if let Content::Children(c) = &mut m.content {
                    c.clear();
                }
            }
            NodeKind::Seq(s) => {
                if let Content::Children(c) = &mut s.content {
                    c.clear();
                }
            }
            NodeKind::Value(..) => {}
        }
        let id = self.insert(data);

        match &source.kind {
            NodeKind::Map(m) => {
                if let Some(children) = m.content.children() {
                    let copied: Vec<(Key, NodeId)> = children
                        .iter()
                        .map(|(k, c)| (k.clone(), self.copy_from(src, *c, Some(id), Some(k.clone()))))
                        .collect();
                    if let NodeKind::Map(dest) = &mut self[id].kind {
                        dest.content = Content::Children(copied.into_iter().collect());
                    }
                }
            }
            NodeKind::Seq(s) => {
                if let Some(children) = s.content.children() {
                    let copied: Vec<NodeId> = children
                        .iter()
                        .enumerate()
                        .map(|(i, c)| self.copy_from(src, *c, Some(id), Some(Key::Index(i as i64))))
                        .collect();
                    if let NodeKind::Seq(dest) = &mut self[id].kind {
                        dest.content = Content::Children(copied);
                    }
                }
            }
            NodeKind::Value(..) => {}
        }
        id
    }

    /// Swap `old` for `new` in `parent`'s children, then drop `old`
    pub(crate) fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        match &mut self[parent].kind {
            NodeKind::Map(m) => {
                if let Some(children) = m.content.children_mut() {
                    if let Some(slot) = children.values_mut().find(|c| **c == old) {
                        *slot = new;
                    }
                }
            }
            NodeKind::Seq(s) => {
                if let Some(children) = s.content.children_mut() {
                    if let Some(slot) = children.iter_mut().find(|c| **c == old) {
                        *slot = new;
                    }
                }
            }
            NodeKind::Value(..) => {}
        }
        self.remove(old);
    }

    /// Whether a key absent from the map `id` may be read or added.
    ///
    /// Typed maps only admit the fields of their schema, unless struct mode
    /// is switched off on the map itself or the schema is dict-compatible.
    pub(crate) fn admits_key(&self, id: NodeId, key: &Key) -> bool {
        let data = &self[id];
        match data.schema_type() {
            Some(schema) => {
                data.flags.get(Flag::Struct) == Some(false)
                    || schema.is_dict_compatible()
                    || key.as_str().is_some_and(|k| schema.field(k).is_some())
            }
            None => self.flag(id, Flag::Struct) != Some(true),
        }
    }

    /// Add `child` to a container with children
    pub(crate) fn attach(&mut self, parent: NodeId, key: Key, child: NodeId) {
        match &mut self[parent].kind {
            NodeKind::Map(m) => {
                if let Some(children) = m.content.children_mut() {
                    children.insert(key, child);
                }
            }
            NodeKind::Seq(s) => {
                if let Some(children) = s.content.children_mut() {
                    children.push(child);
                }
            }
            NodeKind::Value(..) => {}
        }
    }

    /// Insert `child` at `index` of a sequence and re-number its siblings
    pub(crate) fn insert_at(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let NodeKind::Seq(s) = &mut self[parent].kind {
            if let Some(children) = s.content.children_mut() {
                children.insert(index.min(children.len()), child);
            }
        }
        self.reindex(parent);
    }

    /// Unlink `child` from its container and drop its subtree
    pub(crate) fn detach(&mut self, parent: NodeId, child: NodeId) {
        match &mut self[parent].kind {
            NodeKind::Map(m) => {
                if let Some(children) = m.content.children_mut() {
                    children.retain(|_, c| *c != child);
                }
            }
            NodeKind::Seq(s) => {
                if let Some(children) = s.content.children_mut() {
                    children.retain(|c| *c != child);
                }
            }
            NodeKind::Value(..) => {}
        }
        self.remove(child);
        if matches!(self[parent].kind, NodeKind::Seq(_)) {
            self.reindex(parent);
        }
    }

    /// Move the content of `donor` into `into`, replacing what `into` held.
    ///
    /// `into` keeps its key, parent and declared type; it takes over the
    /// donor's kind, children and locally set flags.
    pub(crate) fn transplant(&mut self, donor: NodeId, into: NodeId) {
        for old in self[into].child_ids() {
            self.remove(old);
        }
        let Some(data) = self.slots.get_mut(donor.0).and_then(Option::take) else {
            return;
        };
        self.free.push(donor.0);
        for child in data.child_ids() {
            self[child].parent = Some(into);
        }
        let target = &mut self[into];
        target.flags.overlay(&data.flags);
        target.kind = data.kind;
    }

    /// Unresolved value of a subtree; enum keys are written as member names
    pub(crate) fn raw_value(&self, id: NodeId) -> Value {
        let data = &self[id];
        if let Some(raw) = data.raw_scalar() {
            return raw;
        }
        match &data.kind {
            NodeKind::Map(m) => Value::Mapping(
                m.content
                    .children()
                    .map(|c| {
                        c.iter()
                            .map(|(k, child)| (k.to_key_string(), self.raw_value(*child)))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            NodeKind::Seq(s) => Value::Sequence(
                s.content
                    .children()
                    .map(|c| c.iter().map(|child| self.raw_value(*child)).collect())
                    .unwrap_or_default(),
            ),
            NodeKind::Value(_, v) => v.clone(),
        }
    }

    /// Remove every child of a container, leaving it with `content`
    pub(crate) fn reset_content(&mut self, id: NodeId, raw: ContentState) {
        for child in self[id].child_ids() {
            self.remove(child);
        }
        match &mut self[id].kind {
            NodeKind::Map(m) => m.content = raw.into_content(Default::default()),
            NodeKind::Seq(s) => s.content = raw.into_content(Vec::new()),
            NodeKind::Value(..) => {}
        }
    }

    /// Re-number the keys of a sequence's children after insert/remove
    pub(crate) fn reindex(&mut self, id: NodeId) {
        let children = self[id].child_ids();
        for (i, child) in children.into_iter().enumerate() {
            self[child].key = Some(Key::Index(i as i64));
        }
    }
}

/// Content a container can be reset to
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContentState {
    Empty,
    Missing,
    Interpolation(String),
    Null,
}

impl ContentState {
    fn into_content<T>(self, empty: T) -> Content<T> {
        match self {
            ContentState::Empty => Content::Children(empty),
            ContentState::Missing => Content::Missing,
            ContentState::Interpolation(s) => Content::Interpolation(s),
            ContentState::Null => Content::Null,
        }
    }

    pub(crate) fn of<T>(content: &Content<T>) -> Self {
        match content {
            Content::Children(_) => ContentState::Empty,
            Content::Missing => ContentState::Missing,
            Content::Interpolation(s) => ContentState::Interpolation(s.clone()),
            Content::Null => ContentState::Null,
        }
    }
}

impl Index<NodeId> for Tree {
    type Output = NodeData;

    fn index(&self, id: NodeId) -> &NodeData {
        match self.slots.get(id.0) {
            Some(Some(data)) => data,
            _ => panic!("dangling node id {}", id.0),
        }
    }
}

impl IndexMut<NodeId> for Tree {
    fn index_mut(&mut self, id: NodeId) -> &mut NodeData {
        match self.slots.get_mut(id.0) {
            Some(Some(data)) => data,
            _ => panic!("dangling node id {}", id.0),
        }
    }
}
