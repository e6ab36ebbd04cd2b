use std::path::Path;

use crate::tracking::UNKNOWN_LABEL;

/// 登録画像のファイル名から人名を得る（最初の `.` より前）
///
/// `alice.jpg` → `alice`、`bob.2.png` → `bob`
pub fn name_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name.split('.').next()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// L2正規化（ゼロベクトルはそのまま）
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

/// 登録済みの顔埋め込み
#[derive(Debug, Clone)]
struct GalleryEntry {
    name: String,
    embedding: Vec<f32>,
}

/// 既知の顔の一覧。最も類似度の高い登録者を返す
#[derive(Debug, Clone)]
pub struct FaceGallery {
    entries: Vec<GalleryEntry>,
    similarity_threshold: f32,
}

impl FaceGallery {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            entries: Vec::new(),
            similarity_threshold,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, mut embedding: Vec<f32>) {
        normalize(&mut embedding);
        self.entries.push(GalleryEntry {
            name: name.into(),
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 最も近い登録者と類似度。閾値未満なら `unknown`
    pub fn best_match(&self, embedding: &[f32]) -> (&str, f32) {
        let best = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(&entry.embedding, embedding)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((entry, similarity)) if similarity >= self.similarity_threshold => {
                (entry.name.as_str(), similarity)
            }
            Some((_, similarity)) => (UNKNOWN_LABEL, similarity),
            None => (UNKNOWN_LABEL, 0.0),
        }
    }

    pub fn identify(&self, embedding: &[f32]) -> &str {
        self.best_match(embedding).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_name_from_path() {
        assert_eq!(name_from_path(&PathBuf::from("db/alice.jpg")), Some("alice".to_string()));
        assert_eq!(name_from_path(&PathBuf::from("db/bob.2.png")), Some("bob".to_string()));
        assert_eq!(name_from_path(&PathBuf::from("db/.hidden")), None);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_identify_picks_closest() {
        let mut gallery = FaceGallery::new(0.5);
        gallery.insert("alice", vec![1.0, 0.0, 0.0]);
        gallery.insert("bob", vec![0.0, 1.0, 0.0]);

        assert_eq!(gallery.identify(&[0.9, 0.1, 0.0]), "alice");
        assert_eq!(gallery.identify(&[0.2, 0.8, 0.1]), "bob");
    }

    #[test]
    fn test_below_threshold_is_unknown() {
        let mut gallery = FaceGallery::new(0.5);
        gallery.insert("alice", vec![1.0, 0.0]);
        let (name, similarity) = gallery.best_match(&[0.3, 1.0]);
        assert_eq!(name, UNKNOWN_LABEL);
        assert!(similarity < 0.5);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let gallery = FaceGallery::new(0.5);
        assert!(gallery.is_empty());
        assert_eq!(gallery.identify(&[1.0, 0.0]), UNKNOWN_LABEL);
    }
}
