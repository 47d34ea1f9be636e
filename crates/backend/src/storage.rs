use async_trait::async_trait;
use url::Url;

use crate::error::BackendResult;

/// Bucketed object storage with public URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a new object. Existing objects are not overwritten.
    async fn upload_file(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> BackendResult<()>;

    /// Remove objects. Paths that do not exist are ignored.
    async fn remove_files(&self, bucket: &str, paths: &[String]) -> BackendResult<()>;

    fn get_public_url(&self, bucket: &str, path: &str) -> BackendResult<Url>;
}

/// Recover the object path from a public URL produced for `bucket`.
///
/// The path is returned as it appears in the URL (still percent-encoded).
pub fn object_path_from_public_url(url: &str, bucket: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let marker = format!("/object/public/{bucket}/");
    let path = parsed.path();
    let start = path.find(&marker)? + marker.len();
    let rest = &path[start..];
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_path() {
        let url = "https://x.supabase.co/storage/v1/object/public/publication-documents/abc/17_paper.pdf";
        assert_eq!(
            object_path_from_public_url(url, "publication-documents").as_deref(),
            Some("abc/17_paper.pdf")
        );
    }

    #[test]
    fn other_bucket_is_not_matched() {
        let url = "https://x.supabase.co/storage/v1/object/public/avatars/abc/me.png";
        assert_eq!(object_path_from_public_url(url, "publication-documents"), None);
        assert_eq!(object_path_from_public_url("not a url", "avatars"), None);
    }
}
