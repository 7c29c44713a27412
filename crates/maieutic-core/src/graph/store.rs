//! Sled-backed graph store with label lookup, fuzzy search, pattern query,
//! and bounded traversal.
//!
//! Layout: one `Db`, five trees.
//!
//! | Tree         | Key                      | Value          |
//! |--------------|--------------------------|----------------|
//! | `nouns`      | noun id (16 bytes)       | JSON `Noun`    |
//! | `labels`     | normalized label         | noun id        |
//! | `relations`  | relation id (16 bytes)   | JSON `Relation`|
//! | `edges_from` | `{from_id}/{rel_id}`     | relation id    |
//! | `edges_to`   | `{to_id}/{rel_id}`       | relation id    |
//!
//! The composite prefix keys make `relations_from`/`relations_to` a prefix
//! scan, and cascade deletion a pair of prefix scans. All mutations are
//! serialized by a store-level writer lock so the label-uniqueness check and
//! the insert are atomic; Sled's own log gives durable, crash-safe writes.

use sled::{Db, Tree};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use super::{GraphStats, Noun, NounType, Pattern, QueryTriple, Relation, RelationType, TraversalNode};
use crate::error::{KernelError, KernelResult};
use crate::shared::now_ms;

/// What repeated `link(from, type, to)` calls do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Merge into one edge per `(from, to, type)`, keeping the max weight.
    Merge,
    /// Record every call as its own edge (true multigraph).
    Keep,
}

pub struct GraphStore {
    db: Db,
    nouns: Tree,
    labels: Tree,
    relations: Tree,
    edges_from: Tree,
    edges_to: Tree,
    policy: DuplicatePolicy,
    /// Serializes mutations; reads go straight to Sled.
    write_lock: Mutex<()>,
}

impl GraphStore {
    /// Opens or creates the store at the given path with the merge policy.
    pub fn open_path<P: AsRef<Path>>(path: P) -> KernelResult<Self> {
        Self::open_path_with(path, DuplicatePolicy::Merge)
    }

    /// Opens or creates the store at the given path with an explicit
    /// duplicate-edge policy.
    pub fn open_path_with<P: AsRef<Path>>(path: P, policy: DuplicatePolicy) -> KernelResult<Self> {
        let db = sled::open(path)?;
        let nouns = db.open_tree("nouns")?;
        let labels = db.open_tree("labels")?;
        let relations = db.open_tree("relations")?;
        let edges_from = db.open_tree("edges_from")?;
        let edges_to = db.open_tree("edges_to")?;
        Ok(Self {
            db,
            nouns,
            labels,
            relations,
            edges_from,
            edges_to,
            policy,
            write_lock: Mutex::new(()),
        })
    }

    fn normalize(label: &str) -> String {
        label.trim().to_lowercase()
    }

    fn edge_key(node_id: Uuid, rel_id: Uuid) -> String {
        format!("{}/{}", node_id, rel_id)
    }

    /// Exact case-insensitive lookup; creates the noun if absent.
    /// An existing noun keeps its stored type and properties.
    pub fn ensure_noun(
        &self,
        label: &str,
        noun_type: NounType,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> KernelResult<Noun> {
        let norm = Self::normalize(label);
        if norm.is_empty() {
            return Err(KernelError::NounNotFound("(empty label)".into()));
        }
        let _guard = self.write_lock.lock().unwrap();
        if let Some(id_bytes) = self.labels.get(norm.as_bytes())? {
            if let Some(bytes) = self.nouns.get(&id_bytes)? {
                if let Some(noun) = Noun::from_bytes(&bytes) {
                    return Ok(noun);
                }
            }
        }
        let noun = Noun {
            id: Uuid::new_v4(),
            label: norm.clone(),
            noun_type,
            properties,
            created_at: now_ms(),
        };
        self.nouns.insert(noun.id.as_bytes(), noun.to_bytes())?;
        self.labels.insert(norm.as_bytes(), noun.id.as_bytes().to_vec())?;
        tracing::debug!(
            target: "maieutic::graph",
            label = %noun.label,
            noun_type = noun.noun_type.as_str(),
            "noun created"
        );
        Ok(noun)
    }

    /// Exact lookup only.
    pub fn find(&self, label: &str) -> KernelResult<Option<Noun>> {
        let norm = Self::normalize(label);
        let Some(id_bytes) = self.labels.get(norm.as_bytes())? else {
            return Ok(None);
        };
        let Some(bytes) = self.nouns.get(&id_bytes)? else {
            return Ok(None);
        };
        Ok(Noun::from_bytes(&bytes))
    }

    /// Loads a noun by id.
    pub fn noun(&self, id: Uuid) -> KernelResult<Option<Noun>> {
        let Some(bytes) = self.nouns.get(id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Noun::from_bytes(&bytes))
    }

    /// Case-insensitive substring search over labels, most-recent first.
    pub fn search(&self, query: &str, limit: usize) -> KernelResult<Vec<Noun>> {
        let q = Self::normalize(query);
        if q.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Noun> = Vec::new();
        for item in self.nouns.iter() {
            let (_, value) = item?;
            if let Some(noun) = Noun::from_bytes(&value) {
                if noun.label.contains(&q) {
                    hits.push(noun);
                }
            }
        }
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.label.cmp(&b.label)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Ensures both nouns exist and creates (or merges) the edge between them.
    pub fn link(
        &self,
        from_label: &str,
        rel_type: RelationType,
        to_label: &str,
        weight: f32,
        context_label: Option<&str>,
    ) -> KernelResult<Relation> {
        let from = self.ensure_noun(from_label, NounType::Unknown, serde_json::Map::new())?;
        let to = self.ensure_noun(to_label, NounType::Unknown, serde_json::Map::new())?;
        let context_id = match context_label {
            Some(label) => Some(
                self.ensure_noun(label, NounType::Context, serde_json::Map::new())?
                    .id,
            ),
            None => None,
        };
        self.create_relation(from.id, rel_type, to.id, weight, context_id, serde_json::Map::new())
    }

    /// Creates a relation between two existing nouns. Under
    /// [`DuplicatePolicy::Merge`] a matching `(from, to, type)` edge is
    /// updated in place with the max weight.
    pub fn create_relation(
        &self,
        from_id: Uuid,
        rel_type: RelationType,
        to_id: Uuid,
        weight: f32,
        context_id: Option<Uuid>,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> KernelResult<Relation> {
        if self.noun(from_id)?.is_none() {
            return Err(KernelError::NounNotFound(from_id.to_string()));
        }
        if self.noun(to_id)?.is_none() {
            return Err(KernelError::NounNotFound(to_id.to_string()));
        }
        let weight = weight.clamp(0.0, 1.0);
        let _guard = self.write_lock.lock().unwrap();

        if self.policy == DuplicatePolicy::Merge {
            let prefix = format!("{}/", from_id);
            for item in self.edges_from.scan_prefix(prefix.as_bytes()) {
                let (_, rel_id_bytes) = item?;
                let Some(mut existing) = self.relation_by_id_bytes(&rel_id_bytes)? else {
                    continue;
                };
                if existing.to_id == to_id && existing.rel_type == rel_type {
                    if weight > existing.weight {
                        existing.weight = weight;
                        self.relations
                            .insert(existing.id.as_bytes(), existing.to_bytes())?;
                    }
                    return Ok(existing);
                }
            }
        }

        let relation = Relation {
            id: Uuid::new_v4(),
            from_id,
            to_id,
            rel_type,
            weight,
            context_id,
            properties,
            created_at: now_ms(),
        };
        self.relations
            .insert(relation.id.as_bytes(), relation.to_bytes())?;
        self.edges_from.insert(
            Self::edge_key(from_id, relation.id).as_bytes(),
            relation.id.as_bytes().to_vec(),
        )?;
        self.edges_to.insert(
            Self::edge_key(to_id, relation.id).as_bytes(),
            relation.id.as_bytes().to_vec(),
        )?;
        tracing::debug!(
            target: "maieutic::graph",
            rel_type = rel_type.as_str(),
            weight,
            "relation created"
        );
        Ok(relation)
    }

    fn relation_by_id_bytes(&self, id_bytes: &[u8]) -> KernelResult<Option<Relation>> {
        let Some(bytes) = self.relations.get(id_bytes)? else {
            return Ok(None);
        };
        Ok(Relation::from_bytes(&bytes))
    }

    /// Outgoing edges of a noun, joined with the target noun.
    pub fn relations_from(
        &self,
        id: Uuid,
        rel_type: Option<RelationType>,
    ) -> KernelResult<Vec<(Relation, Noun)>> {
        self.scan_edges(&self.edges_from, id, rel_type, |rel| rel.to_id)
    }

    /// Incoming edges of a noun, joined with the source noun.
    pub fn relations_to(
        &self,
        id: Uuid,
        rel_type: Option<RelationType>,
    ) -> KernelResult<Vec<(Relation, Noun)>> {
        self.scan_edges(&self.edges_to, id, rel_type, |rel| rel.from_id)
    }

    fn scan_edges(
        &self,
        index: &Tree,
        id: Uuid,
        rel_type: Option<RelationType>,
        neighbor: impl Fn(&Relation) -> Uuid,
    ) -> KernelResult<Vec<(Relation, Noun)>> {
        let prefix = format!("{}/", id);
        let mut out = Vec::new();
        for item in index.scan_prefix(prefix.as_bytes()) {
            let (_, rel_id_bytes) = item?;
            let Some(relation) = self.relation_by_id_bytes(&rel_id_bytes)? else {
                continue;
            };
            if let Some(rt) = rel_type {
                if relation.rel_type != rt {
                    continue;
                }
            }
            let Some(noun) = self.noun(neighbor(&relation))? else {
                continue;
            };
            out.push((relation, noun));
        }
        Ok(out)
    }

    /// Deletes a noun and cascades to its incident relations.
    /// Returns false if the noun did not exist.
    pub fn delete_noun(&self, id: Uuid) -> KernelResult<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let Some(bytes) = self.nouns.remove(id.as_bytes())? else {
            return Ok(false);
        };
        if let Some(noun) = Noun::from_bytes(&bytes) {
            self.labels.remove(noun.label.as_bytes())?;
        }
        let prefix = format!("{}/", id);
        let mut incident: Vec<Relation> = Vec::new();
        for index in [&self.edges_from, &self.edges_to] {
            for item in index.scan_prefix(prefix.as_bytes()) {
                let (_, rel_id_bytes) = item?;
                if let Some(relation) = self.relation_by_id_bytes(&rel_id_bytes)? {
                    incident.push(relation);
                }
            }
        }
        for relation in incident {
            self.relations.remove(relation.id.as_bytes())?;
            self.edges_from
                .remove(Self::edge_key(relation.from_id, relation.id).as_bytes())?;
            self.edges_to
                .remove(Self::edge_key(relation.to_id, relation.id).as_bytes())?;
        }
        tracing::debug!(target: "maieutic::graph", %id, "noun deleted (cascade)");
        Ok(true)
    }

    /// Pattern query over all triples, ordered by descending weight, bounded.
    pub fn query(&self, pattern: &Pattern, limit: usize) -> KernelResult<Vec<QueryTriple>> {
        let mut out: Vec<QueryTriple> = Vec::new();
        for item in self.relations.iter() {
            let (_, value) = item?;
            let Some(relation) = Relation::from_bytes(&value) else {
                continue;
            };
            let (Some(from), Some(to)) = (self.noun(relation.from_id)?, self.noun(relation.to_id)?)
            else {
                continue;
            };
            if pattern.matches(&from, &relation, &to) {
                out.push(QueryTriple { from, relation, to });
            }
        }
        out.sort_by(|a, b| {
            b.relation
                .weight
                .partial_cmp(&a.relation.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.relation.created_at.cmp(&b.relation.created_at))
        });
        out.truncate(limit);
        Ok(out)
    }

    /// Depth-bounded BFS over outgoing edges only.
    pub fn traverse(
        &self,
        start_id: Uuid,
        max_depth: usize,
    ) -> KernelResult<HashMap<Uuid, TraversalNode>> {
        let Some(start) = self.noun(start_id)? else {
            return Err(KernelError::NounNotFound(start_id.to_string()));
        };
        let mut visited: HashMap<Uuid, TraversalNode> = HashMap::new();
        let mut queue: VecDeque<(Uuid, usize, Vec<String>)> = VecDeque::new();
        let start_path = vec![start.label.clone()];
        visited.insert(
            start_id,
            TraversalNode {
                noun: start,
                depth: 0,
                path: start_path.clone(),
            },
        );
        queue.push_back((start_id, 0, start_path));
        while let Some((id, depth, path)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (_, neighbor) in self.relations_from(id, None)? {
                if visited.contains_key(&neighbor.id) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(neighbor.label.clone());
                queue.push_back((neighbor.id, depth + 1, next_path.clone()));
                visited.insert(
                    neighbor.id,
                    TraversalNode {
                        noun: neighbor,
                        depth: depth + 1,
                        path: next_path,
                    },
                );
            }
        }
        Ok(visited)
    }

    /// Aggregate counts, including per-type edge counts.
    pub fn stats(&self) -> KernelResult<GraphStats> {
        let mut types: std::collections::BTreeMap<String, usize> = Default::default();
        let mut relations = 0usize;
        for item in self.relations.iter() {
            let (_, value) = item?;
            if let Some(relation) = Relation::from_bytes(&value) {
                relations += 1;
                *types.entry(relation.rel_type.as_str().to_string()).or_default() += 1;
            }
        }
        Ok(GraphStats {
            nouns: self.nouns.len(),
            relations,
            types,
        })
    }

    /// Forces outstanding writes to disk.
    pub fn flush(&self) -> KernelResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NounFilter;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> GraphStore {
        GraphStore::open_path(dir.path().join("graph")).unwrap()
    }

    #[test]
    fn ensure_noun_is_idempotent_and_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        let a = store
            .ensure_noun("  Gravity ", NounType::Concept, Default::default())
            .unwrap();
        let b = store
            .ensure_noun("gravity", NounType::Unknown, Default::default())
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.label, "gravity");
        // existing noun keeps its original type
        assert_eq!(b.noun_type, NounType::Concept);
        assert_eq!(store.stats().unwrap().nouns, 1);
    }

    #[test]
    fn find_is_exact_and_search_is_substring_most_recent_first() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store
            .ensure_noun("gravity", NounType::Concept, Default::default())
            .unwrap();
        store
            .ensure_noun("gravitation", NounType::Concept, Default::default())
            .unwrap();
        assert!(store.find("gravit").unwrap().is_none());
        assert!(store.find("gravity").unwrap().is_some());
        let hits = store.search("gravit", 10).unwrap();
        assert_eq!(hits.len(), 2);
        // created later, so ranked first (ties fall back to label order)
        assert!(hits[0].created_at >= hits[1].created_at);
        assert_eq!(store.search("gravit", 1).unwrap().len(), 1);
    }

    #[test]
    fn repeated_link_does_not_grow_results_under_merge() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store
            .link("dog", RelationType::IsA, "mammal", 0.4, None)
            .unwrap();
        store
            .link("dog", RelationType::IsA, "mammal", 0.9, None)
            .unwrap();
        store
            .link("dog", RelationType::IsA, "mammal", 0.6, None)
            .unwrap();
        let dog = store.find("dog").unwrap().unwrap();
        let edges = store.relations_from(dog.id, Some(RelationType::IsA)).unwrap();
        assert_eq!(edges.len(), 1);
        assert!((edges[0].0.weight - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn keep_policy_records_separate_edges_ordered_by_weight_in_query() {
        let dir = tempdir().unwrap();
        let store =
            GraphStore::open_path_with(dir.path().join("graph"), DuplicatePolicy::Keep).unwrap();
        store
            .link("x", RelationType::Equals, "5", 0.3, None)
            .unwrap();
        store
            .link("x", RelationType::Equals, "5", 0.8, None)
            .unwrap();
        let triples = store
            .query(
                &Pattern {
                    from: Some(NounFilter::label("x")),
                    relation: Some(RelationType::Equals),
                    to: Some(NounFilter::label("5")),
                },
                10,
            )
            .unwrap();
        assert_eq!(triples.len(), 2);
        assert!(triples[0].relation.weight >= triples[1].relation.weight);
    }

    #[test]
    fn delete_noun_cascades_to_incident_relations() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store
            .link("cell", RelationType::Has, "nucleus", 1.0, None)
            .unwrap();
        store
            .link("tissue", RelationType::Contains, "cell", 1.0, None)
            .unwrap();
        let cell = store.find("cell").unwrap().unwrap();
        assert!(store.delete_noun(cell.id).unwrap());
        assert!(store.find("cell").unwrap().is_none());
        assert_eq!(store.stats().unwrap().relations, 0);
        let nucleus = store.find("nucleus").unwrap().unwrap();
        assert!(store.relations_to(nucleus.id, None).unwrap().is_empty());
    }

    #[test]
    fn traverse_is_depth_bounded_and_outgoing_only() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store
            .link("dog", RelationType::IsA, "mammal", 1.0, None)
            .unwrap();
        store
            .link("mammal", RelationType::IsA, "animal", 1.0, None)
            .unwrap();
        store
            .link("animal", RelationType::IsA, "organism", 1.0, None)
            .unwrap();
        let dog = store.find("dog").unwrap().unwrap();
        let visited = store.traverse(dog.id, 2).unwrap();
        let labels: Vec<&str> = visited.values().map(|n| n.noun.label.as_str()).collect();
        assert!(labels.contains(&"dog"));
        assert!(labels.contains(&"mammal"));
        assert!(labels.contains(&"animal"));
        assert!(!labels.contains(&"organism"));
        let animal = store.find("animal").unwrap().unwrap();
        assert_eq!(visited[&animal.id].depth, 2);
        assert_eq!(visited[&animal.id].path, vec!["dog", "mammal", "animal"]);
    }

    #[test]
    fn reopen_preserves_nouns_and_relations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph");
        {
            let store = GraphStore::open_path(&path).unwrap();
            store
                .link("photosynthesis", RelationType::Produces, "oxygen", 0.6, None)
                .unwrap();
            store.flush().unwrap();
        }
        let store = GraphStore::open_path(&path).unwrap();
        let noun = store.find("photosynthesis").unwrap().unwrap();
        let edges = store.relations_from(noun.id, None).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].1.label, "oxygen");
    }

    #[test]
    fn create_relation_rejects_missing_nouns() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        let err = store.create_relation(
            Uuid::new_v4(),
            RelationType::Has,
            Uuid::new_v4(),
            1.0,
            None,
            Default::default(),
        );
        assert!(matches!(err, Err(KernelError::NounNotFound(_))));
    }
}
