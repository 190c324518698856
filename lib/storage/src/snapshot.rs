// Panel dataset snapshots: plain JSON or gzip-compressed JSON
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use panelx_core::{Embedder, PanelId, PanelRecord, Result};

use crate::index::{IndexEntry, MemoryVectorIndex};
use crate::memory::MemoryAttributeStore;

/// An indexed answer; the vector is computed on load when absent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerData {
    pub panel_id: PanelId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelSnapshot {
    #[serde(default)]
    pub records: Vec<PanelRecord>,
    /// Free-text profile answers
    #[serde(default)]
    pub free_text: Vec<AnswerData>,
    /// Survey-poll answers
    #[serde(default)]
    pub poll: Vec<AnswerData>,
}

/// In-memory collaborators populated from a snapshot
pub struct LoadedSnapshot {
    pub attributes: Arc<MemoryAttributeStore>,
    pub free_text: Arc<MemoryVectorIndex>,
    pub poll: Arc<MemoryVectorIndex>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("gz")
}

impl PanelSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut json_data = Vec::new();
        if is_gzip(path) {
            GzDecoder::new(BufReader::new(file)).read_to_end(&mut json_data)?;
        } else {
            BufReader::new(file).read_to_end(&mut json_data)?;
        }
        let snapshot: PanelSnapshot = serde_json::from_slice(&json_data)?;
        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            free_text = snapshot.free_text.len(),
            poll = snapshot.poll.len(),
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json_data = serde_json::to_vec(self)?;
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            encoder.write_all(&json_data)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            writer.write_all(&json_data)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Builds the attribute store and both indices, embedding answers
    /// that carry no vector with `embedder`.
    pub async fn into_collaborators(self, embedder: &dyn Embedder) -> Result<LoadedSnapshot> {
        let dimension = embedder.dimension();
        let free_text = Arc::new(MemoryVectorIndex::new("free_text", dimension));
        let poll = Arc::new(MemoryVectorIndex::new("poll", dimension));

        free_text.insert_batch(embed_missing(self.free_text, embedder).await?)?;
        poll.insert_batch(embed_missing(self.poll, embedder).await?)?;

        Ok(LoadedSnapshot {
            attributes: Arc::new(MemoryAttributeStore::with_records(self.records)),
            free_text,
            poll,
        })
    }
}

async fn embed_missing(answers: Vec<AnswerData>, embedder: &dyn Embedder) -> Result<Vec<IndexEntry>> {
    let missing: Vec<String> = answers
        .iter()
        .filter(|a| a.vector.is_none())
        .map(|a| a.text.clone())
        .collect();
    let mut computed = if missing.is_empty() {
        Vec::new()
    } else {
        embedder.embed_batch(&missing).await?
    }
    .into_iter();

    let mut entries = Vec::with_capacity(answers.len());
    for answer in answers {
        let vector = match answer.vector {
            Some(v) => v,
            None => computed.next().unwrap_or_default(),
        };
        entries.push(IndexEntry {
            panel_id: answer.panel_id,
            answer_text: answer.text,
            vector: vector.into(),
        });
    }
    Ok(entries)
}
