use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{PublisherError, Result};

/// A past social media post: its image and how many likes it got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostData {
    /// Path of the post image on disk
    pub image_path: PathBuf,
    /// Engagement used to rank the post
    pub likes: i64,
}

impl PostData {
    /// Creates a post
    pub fn new(image_path: impl Into<PathBuf>, likes: i64) -> Self {
        Self {
            image_path: image_path.into(),
            likes,
        }
    }
}

/// Splits posts into (popular, less popular) by likes
///
/// Posts are ranked by likes, highest first, with ties keeping their input
/// order. The popular group holds `max(1, floor(len * top_percentage))`
/// posts, capped at the number of posts.
pub fn categorize_posts_by_popularity(
    posts: &[PostData],
    top_percentage: f64,
) -> (Vec<PostData>, Vec<PostData>) {
    let mut sorted = posts.to_vec();
    sorted.sort_by(|a, b| b.likes.cmp(&a.likes));

    let split = ((sorted.len() as f64 * top_percentage).floor() as usize)
        .max(1)
        .min(sorted.len());
    let less_popular = sorted.split_off(split);
    (sorted, less_popular)
}

/// Posts resolved from a posts CSV
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostManifest {
    /// Posts whose image exists
    pub posts: Vec<PostData>,
    /// Image names listed in the CSV but absent on disk
    pub missing: Vec<String>,
    /// Data rows read from the CSV
    pub total_rows: usize,
}

/// Reads a posts CSV with `image` and `likes` columns
///
/// Image names are resolved against `images_dir`. Rows whose image does not
/// exist are reported in [`PostManifest::missing`] rather than failing.
pub async fn load_posts_csv(csv_path: &Path, images_dir: &Path) -> Result<PostManifest> {
    let content = tokio::fs::read_to_string(csv_path).await?;
    let rows = parse_posts_csv(&content)?;

    let mut manifest = PostManifest {
        total_rows: rows.len(),
        ..PostManifest::default()
    };
    for (image, likes) in rows {
        let image_path = images_dir.join(&image);
        if tokio::fs::try_exists(&image_path).await.unwrap_or(false) {
            manifest.posts.push(PostData::new(image_path, likes));
        } else {
            manifest.missing.push(image);
        }
    }

    if !manifest.missing.is_empty() {
        let preview: Vec<_> = manifest.missing.iter().take(5).collect();
        warn!(
            "{} images listed in {} not found: {:?}",
            manifest.missing.len(),
            csv_path.display(),
            preview
        );
    }
    Ok(manifest)
}

/// Parses `image,likes` rows; column order and extra columns are free
pub fn parse_posts_csv(content: &str) -> Result<Vec<(String, i64)>> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_start_matches('\u{feff}'))
        .filter(|l| !l.trim().is_empty());

    let header: Vec<String> = lines
        .next()
        .map(|h| split_row(h).into_iter().map(|c| c.to_lowercase()).collect())
        .unwrap_or_default();
    let column = |name: &str| header.iter().position(|c| c == name);
    let (image_col, likes_col) = match (column("image"), column("likes")) {
        (Some(i), Some(l)) => (i, l),
        _ => {
            return Err(PublisherError::Validation(format!(
                "CSV must have 'image' and 'likes' columns. Found: {:?}",
                header
            )))
        }
    };

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let fields = split_row(line);
        let row_no = index + 2;
        let image = fields.get(image_col).cloned().unwrap_or_default();
        if image.is_empty() {
            return Err(PublisherError::Validation(format!(
                "Row {} has no image name",
                row_no
            )));
        }
        let raw_likes = fields.get(likes_col).map(String::as_str).unwrap_or("");
        let likes = parse_likes(raw_likes).ok_or_else(|| {
            PublisherError::Validation(format!(
                "Row {} has an invalid likes value: {:?}",
                row_no, raw_likes
            ))
        })?;
        rows.push((image, likes));
    }
    Ok(rows)
}

fn parse_likes(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

/// Splits one CSV line, honouring double-quoted fields with `""` escapes
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn likes(posts: &[PostData]) -> Vec<i64> {
        posts.iter().map(|p| p.likes).collect()
    }

    #[test]
    fn test_categorize_splits_top_share() {
        let posts: Vec<_> = [5, 50, 10, 40, 20, 30, 1, 2, 3, 4]
            .iter()
            .enumerate()
            .map(|(i, l)| PostData::new(format!("{i}.png"), *l))
            .collect();

        let (popular, rest) = categorize_posts_by_popularity(&posts, 0.3);
        assert_eq!(likes(&popular), vec![50, 40, 30]);
        assert_eq!(likes(&rest), vec![20, 10, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_categorize_keeps_at_least_one_popular() {
        let posts = vec![PostData::new("a.png", 1), PostData::new("b.png", 2)];
        let (popular, rest) = categorize_posts_by_popularity(&posts, 0.1);
        assert_eq!(likes(&popular), vec![2]);
        assert_eq!(likes(&rest), vec![1]);
    }

    #[test]
    fn test_categorize_ties_keep_input_order() {
        let posts = vec![
            PostData::new("first.png", 7),
            PostData::new("second.png", 7),
            PostData::new("third.png", 7),
        ];
        let (popular, rest) = categorize_posts_by_popularity(&posts, 0.5);
        assert_eq!(popular[0].image_path, PathBuf::from("first.png"));
        assert_eq!(rest[0].image_path, PathBuf::from("second.png"));
    }

    #[test]
    fn test_categorize_empty() {
        let (popular, rest) = categorize_posts_by_popularity(&[], 0.3);
        assert!(popular.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_parse_csv_any_column_order() -> Result<()> {
        let rows = parse_posts_csv("likes,Caption,IMAGE\n12,\"hello, world\",a.png\n\n3.0,x,\"b.jpg\"\n")?;
        assert_eq!(rows, vec![("a.png".to_string(), 12), ("b.jpg".to_string(), 3)]);
        Ok(())
    }

    #[test]
    fn test_parse_csv_errors() {
        assert!(matches!(
            parse_posts_csv("picture,likes\na.png,1"),
            Err(PublisherError::Validation(_))
        ));
        let err = parse_posts_csv("image,likes\na.png,many").unwrap_err();
        assert!(err.to_string().contains("Row 2"));
    }

    #[test]
    fn test_split_row_escaped_quotes() {
        assert_eq!(
            split_row(r#"a, "say ""hi""" ,c"#),
            vec!["a".to_string(), "say \"hi\"".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_posts_csv_reports_missing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.png"), b"x")?;
        let csv = dir.path().join("posts.csv");
        std::fs::write(&csv, "image,likes\na.png,10\nmissing.png,4\n")?;

        let manifest = load_posts_csv(&csv, dir.path()).await?;
        assert_eq!(manifest.total_rows, 2);
        assert_eq!(manifest.posts, vec![PostData::new(dir.path().join("a.png"), 10)]);
        assert_eq!(manifest.missing, vec!["missing.png".to_string()]);
        Ok(())
    }
}
