use crate::error::ArchitectError;
use crate::store::KnowledgeStore;
use crate::types::KnowledgeItem;
use std::path::Path;
use tokio::fs as async_fs;

/// Read a text file as a knowledge item titled after the file name
pub async fn read_knowledge_file(path: &Path) -> Result<KnowledgeItem, ArchitectError> {
    let content = async_fs::read_to_string(path)
        .await
        .map_err(|source| ArchitectError::KnowledgeRead {
            path: path.to_path_buf(),
            source,
        })?;

    let content = content.trim();
    if content.is_empty() {
        return Err(ArchitectError::EmptyKnowledge {
            path: path.to_path_buf(),
        });
    }

    let title = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string());

    Ok(KnowledgeItem::new(title, content))
}

/// Read `path` and add it to the knowledge base
pub async fn ingest_file<S>(store: &S, path: &Path) -> Result<KnowledgeItem, ArchitectError>
where
    S: KnowledgeStore + ?Sized,
{
    let item = read_knowledge_file(path).await?;
    store.add_knowledge(item.clone()).await?;
    tracing::info!(path = %path.display(), id = %item.id, "knowledge file ingested");
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ingest_titles_item_after_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rate-card.md");
        std::fs::write(&path, "\n gemini-1.5-pro costs 4.50 per million units \n").unwrap();

        let store = MemoryStore::new();
        let item = ingest_file(&store, &path).await.unwrap();
        assert_eq!(item.title, "rate-card");
        assert_eq!(item.content, "gemini-1.5-pro costs 4.50 per million units");

        let listed = store.list_knowledge().await.unwrap();
        assert_eq!(listed, vec![item]);
    }

    #[tokio::test]
    async fn test_empty_and_missing_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "   \n").unwrap();

        assert!(matches!(
            read_knowledge_file(&empty).await,
            Err(ArchitectError::EmptyKnowledge { .. })
        ));
        assert!(matches!(
            read_knowledge_file(&dir.path().join("nope.txt")).await,
            Err(ArchitectError::KnowledgeRead { .. })
        ));
    }
}
