use async_trait::async_trait;
use parking_lot::RwLock;
use pitchforge_core::{Pitch, PitchError, PitchResult};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Persistence for pitch versions.
///
/// Saving is an upsert keyed by id, but the lineage fields of a stored pitch
/// (`customer_id`, `version`, `parent_id`) can never change.
#[async_trait]
pub trait PitchRepository: Send + Sync {
    /// Store a version. Rewriting the lineage of a stored version is rejected.
    async fn save(&self, pitch: &Pitch) -> PitchResult<Uuid>;
    /// Load one version.
    async fn get(&self, id: Uuid) -> PitchResult<Pitch>;
    /// Every version from the root (version 1) up to `pitch_id`.
    async fn lineage(&self, pitch_id: Uuid) -> PitchResult<Vec<Pitch>>;
    /// Every version stored for a customer.
    async fn list_for_customer(&self, customer_id: Uuid) -> PitchResult<Vec<Pitch>>;
}

/// Lineage checks shared by every repository.
fn check_save(pitch: &Pitch, existing: Option<&Pitch>, parent: Option<&Pitch>) -> PitchResult<()> {
    if let Some(existing) = existing {
        if !existing.same_lineage(pitch) {
            return Err(PitchError::InputInvalid(format!(
                "pitch {} already exists with different lineage",
                pitch.id
            )));
        }
    }
    match (pitch.parent_id, pitch.version) {
        (None, 1) => Ok(()),
        (None, v) => Err(PitchError::InputInvalid(format!(
            "root pitch {} must be version 1, got {v}",
            pitch.id
        ))),
        (Some(parent_id), _) if parent_id == pitch.id => Err(PitchError::InputInvalid(format!(
            "pitch {} cannot be its own parent",
            pitch.id
        ))),
        (Some(_), v) => match parent {
            Some(parent) if parent.version + 1 != v || parent.customer_id != pitch.customer_id => {
                Err(PitchError::InputInvalid(format!(
                    "pitch {} (v{v}) does not follow its parent {} (v{})",
                    pitch.id, parent.id, parent.version
                )))
            }
            _ => Ok(()),
        },
    }
}

/// Walk parent links from `start` using `load`, returning root-first order.
async fn walk_lineage<F, Fut>(start: Pitch, mut load: F) -> PitchResult<Vec<Pitch>>
where
    F: FnMut(Uuid) -> Fut,
    Fut: std::future::Future<Output = PitchResult<Pitch>>,
{
    let max_steps = start.version as usize;
    let mut chain = vec![start];
    while let Some(parent_id) = chain.last().and_then(|p| p.parent_id) {
        if chain.len() >= max_steps {
            return Err(PitchError::Storage(format!(
                "lineage of {} is longer than its version",
                chain[0].id
            )));
        }
        let parent = load(parent_id).await.map_err(|e| match e {
            PitchError::NotFound(_) => {
                PitchError::Storage(format!("lineage broken: parent {parent_id} is missing"))
            }
            other => other,
        })?;
        chain.push(parent);
    }
    chain.reverse();
    Ok(chain)
}

// ---------------------------------------------------------------------------
// MemoryPitchStore
// ---------------------------------------------------------------------------

/// In-memory pitch store.
#[derive(Default)]
pub struct MemoryPitchStore {
    pitches: RwLock<HashMap<Uuid, Pitch>>,
}

impl MemoryPitchStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self, id: Uuid) -> PitchResult<Pitch> {
        self.pitches
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PitchError::NotFound(format!("pitch {id}")))
    }
}

#[async_trait]
impl PitchRepository for MemoryPitchStore {
    async fn save(&self, pitch: &Pitch) -> PitchResult<Uuid> {
        let mut pitches = self.pitches.write();
        let parent = pitch.parent_id.and_then(|p| pitches.get(&p));
        check_save(pitch, pitches.get(&pitch.id), parent)?;
        pitches.insert(pitch.id, pitch.clone());
        Ok(pitch.id)
    }

    async fn get(&self, id: Uuid) -> PitchResult<Pitch> {
        self.load(id)
    }

    async fn lineage(&self, pitch_id: Uuid) -> PitchResult<Vec<Pitch>> {
        let start = self.load(pitch_id)?;
        walk_lineage(start, |id| std::future::ready(self.load(id))).await
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> PitchResult<Vec<Pitch>> {
        let mut found: Vec<Pitch> = self
            .pitches
            .read()
            .values()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// FilePitchStore
// ---------------------------------------------------------------------------

/// One pretty-printed JSON file per pitch version.
pub struct FilePitchStore {
    dir: PathBuf,
    // Serializes read-check-write in `save`.
    write_lock: tokio::sync::Mutex<()>,
}

impl FilePitchStore {
    /// Store under `dir`, created if missing.
    pub async fn new(dir: PathBuf) -> PitchResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn pitch_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn load_opt(&self, id: Uuid) -> PitchResult<Option<Pitch>> {
        let path = self.pitch_path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let pitch: Pitch = serde_json::from_str(&data)
            .map_err(|e| PitchError::Storage(format!("Failed to parse pitch {id}: {e}")))?;
        Ok(Some(pitch))
    }

    async fn load(&self, id: Uuid) -> PitchResult<Pitch> {
        self.load_opt(id)
            .await?
            .ok_or_else(|| PitchError::NotFound(format!("pitch {id}")))
    }

    async fn all(&self) -> PitchResult<Vec<Pitch>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut pitches = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(id) = name
                .strip_suffix(".json")
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            if let Some(p) = self.load_opt(id).await? {
                pitches.push(p);
            }
        }
        Ok(pitches)
    }
}

#[async_trait]
impl PitchRepository for FilePitchStore {
    async fn save(&self, pitch: &Pitch) -> PitchResult<Uuid> {
        let _guard = self.write_lock.lock().await;
        let existing = self.load_opt(pitch.id).await?;
        let parent = match pitch.parent_id {
            Some(p) => self.load_opt(p).await?,
            None => None,
        };
        check_save(pitch, existing.as_ref(), parent.as_ref())?;

        let json = serde_json::to_string_pretty(pitch)?;
        let tmp = self.dir.join(format!("{}.json.tmp", pitch.id));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.pitch_path(pitch.id)).await?;
        Ok(pitch.id)
    }

    async fn get(&self, id: Uuid) -> PitchResult<Pitch> {
        self.load(id).await
    }

    async fn lineage(&self, pitch_id: Uuid) -> PitchResult<Vec<Pitch>> {
        let start = self.load(pitch_id).await?;
        walk_lineage(start, |id| self.load(id)).await
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> PitchResult<Vec<Pitch>> {
        let mut found: Vec<Pitch> = self
            .all()
            .await?
            .into_iter()
            .filter(|p| p.customer_id == customer_id)
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }
}
