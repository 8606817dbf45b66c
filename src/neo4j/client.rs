//! Neo4j client for interacting with the knowledge graph

use super::models::*;
use crate::graph::mutation::{GraphMutation, MutationBatch};
use crate::graph::related::{EdgeWeights, MAX_NEIGHBORHOOD_PATHS};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use neo4rs::{query, Graph, Query, Txn};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cypher key of a node: the id of a note, the name of a concept or category
fn node_key(var: &str) -> String {
    format!("CASE WHEN {var}:Note THEN {var}.id ELSE {var}.name END")
}

/// Simple paths from a note, strongest first, capped at `$max_paths`.
///
/// The score mirrors `graph::related::path_score` so the cap keeps the paths
/// ranking would keep.
fn neighborhood_cypher(max_hops: usize) -> String {
    format!(
        r#"
        MATCH p = (start:Note {{id: $id}})-[*1..{max_hops}]-(end)
        WHERE all(x IN nodes(p) WHERE single(y IN nodes(p) WHERE y = x))
        WITH p, reduce(s = 1.0, r IN relationships(p) |
            s * CASE type(r)
                    WHEN 'ABOUT' THEN $w_about
                    WHEN 'RELATES_TO' THEN $w_relates_to
                    WHEN 'BELONGS_TO' THEN $w_belongs_to
                    WHEN 'EMBODIES' THEN $w_embodies
                    ELSE 0.0
                END
              * CASE
                    WHEN r.weight IS NULL THEN 1.0
                    WHEN r.weight < 0.0 THEN 0.0
                    WHEN r.weight > 1.0 THEN 1.0
                    ELSE r.weight
                END) AS score
        ORDER BY score DESC, length(p) ASC
        LIMIT $max_paths
        RETURN [r IN relationships(p) | type(r)] AS kinds,
               [r IN relationships(p) | coalesce(r.weight, -1.0)] AS weights,
               [x IN tail(nodes(p)) | labels(x)[0]] AS labels,
               [x IN tail(nodes(p)) | {key}] AS keys,
               [x IN tail(nodes(p)) | coalesce(x.content, x.name)] AS texts,
               [x IN tail(nodes(p)) | coalesce(toString(x.created_at), '')] AS created
        "#,
        key = node_key("x"),
    )
}

/// Resolve a node key, preferring notes over concepts over categories
const RESOLVE_NODE: &str = r#"
    MATCH (s)
    WHERE (s:Note AND s.id = $key)
       OR (s:Concept AND s.name = $key)
       OR (s:Category AND s.name = $key)
    WITH s
    ORDER BY CASE WHEN s:Note THEN 0 WHEN s:Concept THEN 1 ELSE 2 END
    LIMIT 1
"#;

/// Columns describing relationship `r` from `a` (start) to `b` (end)
fn relationship_columns() -> String {
    let end = |var: &str| {
        format!(
            "labels({var})[0] AS {var}_label, {key} AS {var}_key, \
             coalesce({var}.content, {var}.name) AS {var}_text, \
             coalesce(toString({var}.created_at), '') AS {var}_created",
            key = node_key(var)
        )
    };
    format!(
        "elementId(r) AS id, type(r) AS kind, coalesce(r.weight, -1.0) AS weight, \
         coalesce(r.relation, '') AS relation, {}, {}",
        end("a"),
        end("b")
    )
}

/// Relationships of the node with element id `$sid`, optionally one type only
fn relationships_cypher(kind: Option<EdgeKind>) -> String {
    let pattern = kind.map(|k| format!(":{}", k.as_cypher())).unwrap_or_default();
    format!(
        r#"
        MATCH (s)-[r{pattern}]-()
        WHERE elementId(s) = $sid
        WITH DISTINCT r
        WITH r, startNode(r) AS a, endNode(r) AS b
        RETURN {columns}
        ORDER BY kind, id
        "#,
        columns = relationship_columns(),
    )
}

/// Relationships within `max_depth` hops of `$sid`, closest first
fn traverse_cypher(max_depth: usize) -> String {
    format!(
        r#"
        MATCH p = (s)-[*1..{max_depth}]-()
        WHERE elementId(s) = $sid
        UNWIND range(0, length(p) - 1) AS i
        WITH relationships(p)[i] AS r, i + 1 AS depth
        WITH r, min(depth) AS depth
        ORDER BY depth ASC, elementId(r) ASC
        LIMIT $limit
        WITH r, depth, startNode(r) AS a, endNode(r) AS b
        RETURN {columns}, depth
        ORDER BY depth, id
        "#,
        columns = relationship_columns(),
    )
}

/// Build a node reference, or None for a label outside the model
fn node_ref(label: &str, key: String, text: String, created: &str) -> Option<GraphNodeRef> {
    let kind = label.parse::<NodeKind>().ok()?;
    Some(GraphNodeRef {
        kind,
        key,
        label: if kind == NodeKind::Note {
            crate::conversation::types::excerpt(&text, 80)
        } else {
            text
        },
        created_at: created.parse().ok(),
    })
}

fn row_to_node_ref(row: &neo4rs::Row, var: &str) -> Result<Option<GraphNodeRef>> {
    let label: String = row.get(&format!("{var}_label"))?;
    let created: String = row.get(&format!("{var}_created"))?;
    Ok(node_ref(
        &label,
        row.get(&format!("{var}_key"))?,
        row.get(&format!("{var}_text"))?,
        &created,
    ))
}

/// Decode a row of `relationship_columns`, skipping edges outside the model
fn row_to_relationship(row: &neo4rs::Row) -> Result<Option<Relationship>> {
    let kind: String = row.get("kind")?;
    let Ok(kind) = kind.parse::<EdgeKind>() else {
        return Ok(None);
    };
    let (Some(source), Some(target)) = (row_to_node_ref(row, "a")?, row_to_node_ref(row, "b")?)
    else {
        return Ok(None);
    };
    let weight: f64 = row.get("weight")?;
    let relation: String = row.get("relation")?;
    Ok(Some(Relationship {
        id: row.get("id")?,
        kind,
        source,
        target,
        weight: Some(weight).filter(|w| *w >= 0.0),
        relation: Some(relation).filter(|r| !r.is_empty()),
    }))
}

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

impl Neo4jClient {
    /// Create a new Neo4j client
    pub async fn new(uri: &str, user: &str, password: &str, timeout: Duration) -> Result<Self> {
        let graph = tokio::time::timeout(timeout, Graph::new(uri, user, password))
            .await
            .with_context(|| format!("Timed out connecting to Neo4j at {}", uri))?
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        // Initialize schema
        client.init_schema().await?;

        Ok(client)
    }

    /// Initialize the graph schema with constraints and indexes
    async fn init_schema(&self) -> Result<()> {
        let constraints = vec![
            "CREATE CONSTRAINT note_id IF NOT EXISTS FOR (n:Note) REQUIRE n.id IS UNIQUE",
            "CREATE CONSTRAINT concept_name IF NOT EXISTS FOR (c:Concept) REQUIRE c.name IS UNIQUE",
            "CREATE CONSTRAINT category_name IF NOT EXISTS FOR (c:Category) REQUIRE c.name IS UNIQUE",
        ];

        let indexes = vec![
            "CREATE TEXT INDEX note_content IF NOT EXISTS FOR (n:Note) ON (n.content)",
            "CREATE INDEX note_created_at IF NOT EXISTS FOR (n:Note) ON (n.created_at)",
        ];

        for constraint in constraints {
            if let Err(e) = self.graph.run(query(constraint)).await {
                warn!("Constraint may already exist: {}", e);
            }
        }

        for index in indexes {
            if let Err(e) = self.graph.run(query(index)).await {
                warn!("Index may already exist: {}", e);
            }
        }

        Ok(())
    }

    /// Execute a raw Cypher query (internal use only)
    pub(crate) async fn execute(&self, cypher: &str) -> Result<Vec<neo4rs::Row>> {
        self.execute_with_params(query(cypher)).await
    }

    /// Execute a parameterized Cypher query (internal use only)
    pub(crate) async fn execute_with_params(&self, q: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Check connectivity
    pub async fn health_check(&self) -> Result<bool> {
        match self.execute("RETURN 1 AS ping").await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Neo4j health check failed: {}", e);
                Ok(false)
            }
        }
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Merge the default categories
    pub async fn seed_categories(&self) -> Result<usize> {
        for category in default_categories() {
            let q = query(
                r#"
                MERGE (c:Category {name: $name})
                ON CREATE SET c.description = $description
                "#,
            )
            .param("name", category.name.clone())
            .param("description", category.description.clone());
            self.graph
                .run(q)
                .await
                .with_context(|| format!("Failed to seed category {}", category.name))?;
        }

        let rows = self
            .execute("MATCH (c:Category) RETURN count(c) AS total")
            .await?;
        let total = rows
            .first()
            .and_then(|r| r.get::<i64>("total").ok())
            .unwrap_or(0);
        info!("Seeded categories ({} present)", total);
        Ok(total as usize)
    }

    // ========================================================================
    // Transactional writes
    // ========================================================================

    /// Apply a mutation batch in a single transaction
    pub async fn apply_mutations(&self, batch: &MutationBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to open Neo4j transaction")?;

        match run_batch(&mut txn, batch).await {
            Ok(()) => {
                txn.commit()
                    .await
                    .context("Failed to commit Neo4j transaction")?;
                debug!("Committed {} graph mutations", batch.len());
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback failed after batch error: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    // ========================================================================
    // Note operations
    // ========================================================================

    /// Get a note by ID
    pub async fn get_note(&self, id: Uuid) -> Result<Option<NoteNode>> {
        let q = query(
            r#"
            MATCH (n:Note {id: $id})
            RETURN n
            "#,
        )
        .param("id", id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("n")?;
            Ok(Some(self.node_to_note(&node)?))
        } else {
            Ok(None)
        }
    }

    /// List notes, newest first
    pub async fn list_notes(&self, limit: usize, skip: usize) -> Result<Vec<NoteNode>> {
        let q = query(
            r#"
            MATCH (n:Note)
            RETURN n
            ORDER BY n.created_at DESC
            SKIP $skip
            LIMIT $limit
            "#,
        )
        .param("skip", skip as i64)
        .param("limit", limit as i64);

        let mut result = self.graph.execute(q).await?;
        let mut notes = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("n")?;
            notes.push(self.node_to_note(&node)?);
        }
        Ok(notes)
    }

    /// Update note content and/or tags
    pub async fn update_note(
        &self,
        id: Uuid,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Option<NoteNode>> {
        let mut set_clauses = vec!["n.updated_at = datetime($updated_at)"];
        if content.is_some() {
            set_clauses.push("n.content = $content");
        }
        if tags.is_some() {
            set_clauses.push("n.tags = $tags");
        }

        let cypher = format!(
            "MATCH (n:Note {{id: $id}}) SET {} RETURN n",
            set_clauses.join(", ")
        );
        let mut q = query(&cypher)
            .param("id", id.to_string())
            .param("updated_at", Utc::now().to_rfc3339());
        if let Some(content) = content {
            q = q.param("content", content);
        }
        if let Some(tags) = tags {
            q = q.param("tags", tags);
        }

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("n")?;
            Ok(Some(self.node_to_note(&node)?))
        } else {
            Ok(None)
        }
    }

    /// Detach-delete a note
    pub async fn delete_note(&self, id: Uuid) -> Result<bool> {
        let q = query(
            r#"
            MATCH (n:Note {id: $id})
            WITH n, n.id AS deleted_id
            DETACH DELETE n
            RETURN count(deleted_id) AS deleted
            "#,
        )
        .param("id", id.to_string());

        let rows = self.execute_with_params(q).await?;
        let deleted = rows
            .first()
            .and_then(|r| r.get::<i64>("deleted").ok())
            .unwrap_or(0);
        Ok(deleted > 0)
    }

    /// Concepts a note is ABOUT
    pub async fn get_note_concepts(&self, note_id: Uuid) -> Result<Vec<ConceptNode>> {
        let q = query(
            r#"
            MATCH (:Note {id: $id})-[:ABOUT]->(c:Concept)
            RETURN c
            ORDER BY c.name
            "#,
        )
        .param("id", note_id.to_string());

        let mut result = self.graph.execute(q).await?;
        let mut concepts = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("c")?;
            concepts.push(self.node_to_concept(&node)?);
        }
        Ok(concepts)
    }

    // ========================================================================
    // Concept & category operations
    // ========================================================================

    /// Get a concept by name
    pub async fn get_concept(&self, name: &str) -> Result<Option<ConceptNode>> {
        let q = query(
            r#"
            MATCH (c:Concept {name: $name})
            RETURN c
            "#,
        )
        .param("name", name);

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("c")?;
            Ok(Some(self.node_to_concept(&node)?))
        } else {
            Ok(None)
        }
    }

    /// List concepts by name
    pub async fn list_concepts(&self, limit: usize, skip: usize) -> Result<Vec<ConceptNode>> {
        let q = query("MATCH (c:Concept) RETURN c ORDER BY c.name SKIP $skip LIMIT $limit")
            .param("skip", skip as i64)
            .param("limit", limit as i64);
        let mut result = self.graph.execute(q).await?;
        let mut concepts = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("c")?;
            concepts.push(self.node_to_concept(&node)?);
        }
        Ok(concepts)
    }

    /// Detach-delete a concept
    pub async fn delete_concept(&self, name: &str) -> Result<bool> {
        let q = query(
            r#"
            MATCH (c:Concept {name: $name})
            WITH c, c.name AS deleted_name
            DETACH DELETE c
            RETURN count(deleted_name) AS deleted
            "#,
        )
        .param("name", name);

        let rows = self.execute_with_params(q).await?;
        let deleted = rows
            .first()
            .and_then(|r| r.get::<i64>("deleted").ok())
            .unwrap_or(0);
        Ok(deleted > 0)
    }

    /// List all categories
    pub async fn list_categories(&self) -> Result<Vec<CategoryNode>> {
        let mut result = self
            .graph
            .execute(query("MATCH (c:Category) RETURN c ORDER BY c.name"))
            .await?;
        let mut categories = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("c")?;
            categories.push(CategoryNode {
                name: node.get("name")?,
                description: node.get("description").unwrap_or_default(),
            });
        }
        Ok(categories)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Element id and reference of the node a key names
    async fn resolve_node(&self, key: &str) -> Result<Option<(String, GraphNodeRef)>> {
        let cypher = format!(
            "{} RETURN elementId(s) AS sid, labels(s)[0] AS s_label, {} AS s_key, \
             coalesce(s.content, s.name) AS s_text, coalesce(toString(s.created_at), '') AS s_created",
            RESOLVE_NODE,
            node_key("s")
        );
        let rows = self.execute_with_params(query(&cypher).param("key", key)).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let sid: String = row.get("sid")?;
        Ok(row_to_node_ref(row, "s")?.map(|node| (sid, node)))
    }

    /// Relationships touching a node, in either direction
    pub async fn get_relationships(
        &self,
        key: &str,
        kind: Option<EdgeKind>,
    ) -> Result<Option<Vec<Relationship>>> {
        let Some((sid, _)) = self.resolve_node(key).await? else {
            return Ok(None);
        };

        let cypher = relationships_cypher(kind);
        let rows = self
            .execute_with_params(query(&cypher).param("sid", sid))
            .await?;
        let mut relationships = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(rel) = row_to_relationship(row)? {
                relationships.push(rel);
            }
        }
        Ok(Some(relationships))
    }

    /// Delete one relationship by element id
    pub async fn delete_relationship(&self, id: &str) -> Result<bool> {
        let q = query(
            r#"
            MATCH ()-[r]->()
            WHERE elementId(r) = $id
            DELETE r
            RETURN count(*) AS deleted
            "#,
        )
        .param("id", id);

        let rows = self.execute_with_params(q).await?;
        let deleted = rows
            .first()
            .and_then(|r| r.get::<i64>("deleted").ok())
            .unwrap_or(0);
        Ok(deleted > 0)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Relationships reachable within `max_depth` hops of a node
    pub async fn traverse(&self, key: &str, max_depth: usize) -> Result<Option<Subgraph>> {
        let Some((sid, start)) = self.resolve_node(key).await? else {
            return Ok(None);
        };
        if max_depth == 0 {
            return Ok(Some(Subgraph::assemble(start, 0, Vec::new())));
        }

        // Variable-length bounds cannot be parameters
        let cypher = traverse_cypher(max_depth);
        let q = query(&cypher)
            .param("sid", sid)
            .param("limit", (MAX_SUBGRAPH_RELATIONSHIPS + 1) as i64);
        let rows = self.execute_with_params(q).await?;

        let mut relationships = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(rel) = row_to_relationship(row)? {
                relationships.push(rel);
            }
        }
        debug!("Traversal from {} reached {} relationships", key, relationships.len());
        Ok(Some(Subgraph::assemble(start, max_depth, relationships)))
    }

    /// Simple undirected paths of length 1..=max_hops from a note, strongest first
    pub async fn get_neighborhood(
        &self,
        note_id: Uuid,
        max_hops: usize,
        weights: &EdgeWeights,
    ) -> Result<Vec<GraphPath>> {
        if max_hops == 0 {
            return Ok(Vec::new());
        }

        // Variable-length bounds cannot be parameters
        let cypher = neighborhood_cypher(max_hops);
        let q = query(&cypher)
            .param("id", note_id.to_string())
            .param("w_about", weights.about)
            .param("w_relates_to", weights.relates_to)
            .param("w_belongs_to", weights.belongs_to)
            .param("w_embodies", weights.embodies)
            .param("max_paths", MAX_NEIGHBORHOOD_PATHS as i64);

        let mut result = self.graph.execute(q).await?;
        let mut paths = Vec::new();
        while let Some(row) = result.next().await? {
            let kinds: Vec<String> = row.get("kinds")?;
            let weights: Vec<f64> = row.get("weights")?;
            let labels: Vec<String> = row.get("labels")?;
            let keys: Vec<String> = row.get("keys")?;
            let texts: Vec<String> = row.get("texts")?;
            let created: Vec<String> = row.get("created")?;

            let mut hops = Vec::with_capacity(kinds.len());
            for i in 0..kinds.len() {
                let node = labels.get(i).and_then(|label| {
                    node_ref(
                        label,
                        keys.get(i).cloned().unwrap_or_default(),
                        texts.get(i).cloned().unwrap_or_default(),
                        created.get(i).map(String::as_str).unwrap_or(""),
                    )
                });
                let (Ok(edge), Some(node)) = (kinds[i].parse::<EdgeKind>(), node) else {
                    debug!("Skipping path through unknown edge or label");
                    hops.clear();
                    break;
                };
                hops.push(PathHop {
                    edge,
                    weight: weights.get(i).copied().filter(|w| *w >= 0.0),
                    node,
                });
            }
            if !hops.is_empty() {
                paths.push(GraphPath { hops });
            }
        }
        debug!("Neighbourhood of {} has {} paths", note_id, paths.len());
        Ok(paths)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Helper to convert Neo4j node to NoteNode
    fn node_to_note(&self, node: &neo4rs::Node) -> Result<NoteNode> {
        Ok(NoteNode {
            id: node.get::<String>("id")?.parse()?,
            content: node.get("content")?,
            tags: node.get("tags").unwrap_or_default(),
            created_at: read_timestamp(node, "created_at").unwrap_or_else(Utc::now),
            updated_at: read_timestamp(node, "updated_at").unwrap_or_else(Utc::now),
        })
    }

    /// Helper to convert Neo4j node to ConceptNode
    fn node_to_concept(&self, node: &neo4rs::Node) -> Result<ConceptNode> {
        Ok(ConceptNode {
            id: node
                .get::<String>("id")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(Uuid::nil),
            name: node.get("name")?,
            description: node
                .get::<String>("description")
                .ok()
                .filter(|d| !d.is_empty()),
        })
    }
}

/// Timestamps are written with `datetime()` but older data may hold strings
fn read_timestamp(node: &neo4rs::Node, key: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = node.get::<DateTime<FixedOffset>>(key) {
        return Some(dt.with_timezone(&Utc));
    }
    node.get::<String>(key).ok().and_then(|s| s.parse().ok())
}

/// Run every mutation of a batch inside an open transaction
async fn run_batch(txn: &mut Txn, batch: &MutationBatch) -> Result<()> {
    for (i, mutation) in batch.mutations.iter().enumerate() {
        let mut stream = txn
            .execute(mutation_query(mutation))
            .await
            .with_context(|| format!("Mutation {} failed", i))?;

        let mut affected = 0i64;
        while let Some(row) = stream.next(txn.handle()).await? {
            affected += row.get::<i64>("affected").unwrap_or(0);
        }
        if affected == 0 {
            bail!("Mutation {} matched nothing: {}", i, describe_miss(mutation));
        }
    }
    Ok(())
}

fn describe_miss(mutation: &GraphMutation) -> String {
    match mutation {
        GraphMutation::CreateNote(note) => format!("note {} was not created", note.id),
        GraphMutation::UpdateNote { id, .. } => format!("note {} does not exist", id),
        GraphMutation::MergeConcept { name, .. } => format!("concept '{}' was not merged", name),
        GraphMutation::UpdateConcept { name, .. }
        | GraphMutation::ClearConceptCategories { name } => {
            format!("concept '{}' does not exist", name)
        }
        GraphMutation::LinkNoteToConcept { note_id, concept } => {
            format!("note {} or concept '{}' does not exist", note_id, concept)
        }
        GraphMutation::LinkNoteToNote { source, target, .. } => {
            format!("note {} or note {} does not exist", source, target)
        }
        GraphMutation::LinkConceptToCategory {
            concept, category, ..
        } => format!(
            "concept '{}' or category '{}' does not exist",
            concept, category
        ),
        GraphMutation::LinkNoteToCategory {
            note_id, category, ..
        } => format!("note {} or category '{}' does not exist", note_id, category),
    }
}

fn update_concept_cypher(rename: bool, describe: bool) -> String {
    let mut set_clauses = Vec::new();
    if rename {
        set_clauses.push("c.name = $new_name");
    }
    if describe {
        set_clauses.push("c.description = $description");
    }
    if set_clauses.is_empty() {
        return "MATCH (c:Concept {name: $name}) RETURN count(c) AS affected".to_string();
    }
    format!(
        "MATCH (c:Concept {{name: $name}}) SET {} RETURN count(c) AS affected",
        set_clauses.join(", ")
    )
}

/// Cypher for one mutation. Every query returns an `affected` count.
fn mutation_query(mutation: &GraphMutation) -> Query {
    match mutation {
        GraphMutation::CreateNote(note) => query(
            r#"
            CREATE (n:Note {
                id: $id,
                content: $content,
                tags: $tags,
                created_at: datetime($created_at),
                updated_at: datetime($updated_at)
            })
            RETURN count(n) AS affected
            "#,
        )
        .param("id", note.id.to_string())
        .param("content", note.content.clone())
        .param("tags", note.tags.clone())
        .param("created_at", note.created_at.to_rfc3339())
        .param("updated_at", note.updated_at.to_rfc3339()),

        GraphMutation::UpdateNote { id, content, tags } => {
            let mut set_clauses = vec!["n.updated_at = datetime($updated_at)"];
            if content.is_some() {
                set_clauses.push("n.content = $content");
            }
            if tags.is_some() {
                set_clauses.push("n.tags = $tags");
            }
            let cypher = format!(
                "MATCH (n:Note {{id: $id}}) SET {} RETURN count(n) AS affected",
                set_clauses.join(", ")
            );
            let mut q = query(&cypher)
                .param("id", id.to_string())
                .param("updated_at", Utc::now().to_rfc3339());
            if let Some(content) = content {
                q = q.param("content", content.clone());
            }
            if let Some(tags) = tags {
                q = q.param("tags", tags.clone());
            }
            q
        }

        GraphMutation::MergeConcept { name, description } => match description {
            Some(description) => query(
                r#"
                MERGE (c:Concept {name: $name})
                ON CREATE SET c.id = $id, c.description = $description
                ON MATCH SET c.description = CASE
                    WHEN c.description IS NULL OR c.description = '' THEN $description
                    ELSE c.description END
                RETURN count(c) AS affected
                "#,
            )
            .param("name", name.clone())
            .param("id", Uuid::new_v4().to_string())
            .param("description", description.clone()),
            None => query(
                r#"
                MERGE (c:Concept {name: $name})
                ON CREATE SET c.id = $id
                RETURN count(c) AS affected
                "#,
            )
            .param("name", name.clone())
            .param("id", Uuid::new_v4().to_string()),
        },

        GraphMutation::UpdateConcept {
            name,
            new_name,
            description,
        } => {
            let cypher = update_concept_cypher(new_name.is_some(), description.is_some());
            let mut q = query(&cypher).param("name", name.clone());
            if let Some(new_name) = new_name {
                q = q.param("new_name", new_name.clone());
            }
            if let Some(description) = description {
                q = q.param("description", description.clone());
            }
            q
        }

        GraphMutation::ClearConceptCategories { name } => query(
            r#"
            MATCH (c:Concept {name: $name})
            OPTIONAL MATCH (c)-[r:BELONGS_TO]->(:Category)
            DELETE r
            RETURN count(DISTINCT c) AS affected
            "#,
        )
        .param("name", name.clone()),

        GraphMutation::LinkNoteToConcept { note_id, concept } => query(
            r#"
            MATCH (n:Note {id: $note_id})
            MATCH (c:Concept {name: $concept})
            MERGE (n)-[r:ABOUT]->(c)
            RETURN count(r) AS affected
            "#,
        )
        .param("note_id", note_id.to_string())
        .param("concept", concept.clone()),

        GraphMutation::LinkNoteToNote {
            source,
            target,
            relation,
            weight,
        } => query(
            r#"
            MATCH (a:Note {id: $source})
            MATCH (b:Note {id: $target})
            MERGE (a)-[r:RELATES_TO {relation: $relation}]->(b)
            ON CREATE SET r.weight = $weight
            ON MATCH SET r.weight = CASE
                WHEN r.weight IS NULL OR r.weight < $weight THEN $weight
                ELSE r.weight END
            RETURN count(r) AS affected
            "#,
        )
        .param("source", source.to_string())
        .param("target", target.to_string())
        .param("relation", relation.clone())
        .param("weight", *weight),

        GraphMutation::LinkConceptToCategory {
            concept,
            category,
            weight,
        } => query(
            r#"
            MATCH (c:Concept {name: $concept})
            MATCH (k:Category {name: $category})
            MERGE (c)-[r:BELONGS_TO]->(k)
            ON CREATE SET r.weight = $weight
            ON MATCH SET r.weight = CASE
                WHEN r.weight IS NULL OR r.weight < $weight THEN $weight
                ELSE r.weight END
            RETURN count(r) AS affected
            "#,
        )
        .param("concept", concept.clone())
        .param("category", category.clone())
        .param("weight", *weight),

        GraphMutation::LinkNoteToCategory {
            note_id,
            category,
            weight,
        } => query(
            r#"
            MATCH (n:Note {id: $note_id})
            MATCH (k:Category {name: $category})
            MERGE (n)-[r:EMBODIES]->(k)
            ON CREATE SET r.weight = $weight
            ON MATCH SET r.weight = CASE
                WHEN r.weight IS NULL OR r.weight < $weight THEN $weight
                ELSE r.weight END
            RETURN count(r) AS affected
            "#,
        )
        .param("note_id", note_id.to_string())
        .param("category", category.clone())
        .param("weight", *weight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_uses_name_for_concepts_and_categories() {
        assert_eq!(
            node_key("x"),
            "CASE WHEN x:Note THEN x.id ELSE x.name END"
        );
    }

    #[test]
    fn test_neighborhood_query_ranks_before_limiting() {
        let cypher = neighborhood_cypher(3);
        assert!(cypher.contains("-[*1..3]-"));
        assert!(cypher.contains("CASE WHEN x:Note THEN x.id ELSE x.name END"));
        assert!(!cypher.contains("coalesce(x.id"));

        let order = cypher.find("ORDER BY score DESC, length(p) ASC").unwrap();
        let limit = cypher.find("LIMIT $max_paths").unwrap();
        let ret = cypher.find("RETURN").unwrap();
        assert!(order < limit && limit < ret);
        for param in ["$w_about", "$w_relates_to", "$w_belongs_to", "$w_embodies"] {
            assert!(cypher.contains(param), "missing {}", param);
        }
    }

    #[test]
    fn test_relationship_queries_filter_type_and_cap_closest_first() {
        let all = relationships_cypher(None);
        assert!(all.contains("MATCH (s)-[r]-()"));
        let about = relationships_cypher(Some(EdgeKind::About));
        assert!(about.contains("MATCH (s)-[r:ABOUT]-()"));
        assert!(about.contains("CASE WHEN a:Note THEN a.id ELSE a.name END AS a_key"));

        let cypher = traverse_cypher(2);
        assert!(cypher.contains("-[*1..2]-"));
        let order = cypher.find("ORDER BY depth ASC").unwrap();
        let limit = cypher.find("LIMIT $limit").unwrap();
        assert!(order < limit);
    }

    #[test]
    fn test_concept_update_sets_only_given_fields() {
        let cypher = update_concept_cypher(false, true);
        assert!(cypher.contains("SET c.description = $description RETURN"));
        assert!(!cypher.contains("$new_name"));

        let cypher = update_concept_cypher(true, false);
        assert!(cypher.contains("SET c.name = $new_name RETURN"));
    }

    #[test]
    fn test_describe_miss_names_missing_endpoints() {
        let id = Uuid::new_v4();
        let msg = describe_miss(&GraphMutation::LinkNoteToCategory {
            note_id: id,
            category: "Ontology".into(),
            weight: 0.5,
        });
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("Ontology"));
    }
}
