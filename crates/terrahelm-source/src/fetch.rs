//! Getter-style fetching of chart sources and value files
//!
//! Source strings follow the familiar "getter" address format:
//!
//! ```text
//! [<getter>::]<location>[//<subdir>][?<options>]
//! ```
//!
//! Supported getters are `file`, `http`/`https` and `git`. Recognized options
//! are `ref`, `depth` and `sshkey` for git, and `checksum`, `archive` and
//! `filename` for files. Any other query parameters stay on the URL.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::error::{Result, SourceError};
use crate::git::{CloneOptions, GitCli, GitClient};
use crate::http::{HttpClient, compute_digest, digest_matches};

/// What the caller expects to find at the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Directory or file, whichever the source is
    #[default]
    Any,
    /// The destination becomes a directory
    Dir,
    /// The destination becomes a single file
    File,
}

/// Per-fetch options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip TLS verification
    pub insecure: bool,
    pub mode: FetchMode,
}

impl FetchOptions {
    pub fn new(mode: FetchMode, insecure: bool) -> Self {
        Self { insecure, mode }
    }
}

/// Downloads a source string into a local destination
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &str, destination: &Path, options: &FetchOptions) -> Result<()>;
}

/// Getter used for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Getter {
    File,
    Http,
    Git,
}

/// Archive formats understood when unpacking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Tar,
}

impl ArchiveKind {
    fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    fn from_option(value: &str) -> Option<Self> {
        match value {
            "tar.gz" | "tgz" => Some(Self::TarGz),
            "tar" => Some(Self::Tar),
            _ => None,
        }
    }
}

/// A parsed getter address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddress {
    pub getter: Getter,
    /// Location without sub-directory and recognized options
    pub location: String,
    pub subdir: Option<String>,
    pub reference: Option<String>,
    pub depth: Option<u32>,
    /// Base64-encoded private key
    pub ssh_key: Option<String>,
    pub checksum: Option<String>,
    /// `None` when archive handling is disabled or the source is not an archive
    pub archive: Option<ArchiveKind>,
    pub filename: Option<String>,
}

impl SourceAddress {
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(invalid(source, "empty source"));
        }

        let (forced, rest) = match source.find("::") {
            Some(idx) if !source[..idx].contains('/') => {
                (Some(&source[..idx]), &source[idx + 2..])
            }
            _ => (None, source),
        };

        let (base, query) = match rest.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (rest, None),
        };

        let (location, subdir) = split_subdir(base);

        let mut reference = None;
        let mut depth = None;
        let mut ssh_key = None;
        let mut checksum = None;
        let mut archive_option = None;
        let mut filename = None;
        let mut passthrough = Vec::new();

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "ref" => reference = Some(value.into_owned()),
                    "depth" => {
                        depth = Some(value.parse().map_err(|_| {
                            invalid(source, &format!("invalid depth '{}'", value))
                        })?)
                    }
                    "sshkey" => ssh_key = Some(value.into_owned()),
                    "checksum" => checksum = Some(value.into_owned()),
                    "archive" => archive_option = Some(value.into_owned()),
                    "filename" => filename = Some(value.into_owned()),
                    _ => passthrough.push((key.into_owned(), value.into_owned())),
                }
            }
        }

        let getter = match forced {
            Some("git") => Getter::Git,
            Some("file") => Getter::File,
            Some("http") | Some("https") => Getter::Http,
            Some(other @ ("s3" | "gcs" | "hg")) => {
                return Err(SourceError::UnsupportedSource {
                    location: source.to_string(),
                    reason: format!("the '{}' getter is not supported", other),
                });
            }
            Some(other) => {
                return Err(invalid(source, &format!("unknown getter '{}'", other)));
            }
            None => detect_getter(&location),
        };

        let mut location = match getter {
            Getter::Git if location.starts_with("github.com/") || location.starts_with("gitlab.com/") => {
                format!("https://{}", location)
            }
            Getter::File => location
                .strip_prefix("file://")
                .unwrap_or(&location)
                .to_string(),
            _ => location,
        };

        if !passthrough.is_empty() {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(passthrough)
                .finish();
            location = format!("{}?{}", location, query);
        }

        let archive = match archive_option.as_deref() {
            Some("false") => None,
            Some(kind) => Some(ArchiveKind::from_option(kind).ok_or_else(|| {
                SourceError::UnsupportedSource {
                    location: source.to_string(),
                    reason: format!("unsupported archive format '{}'", kind),
                }
            })?),
            None if getter == Getter::Git => None,
            None => ArchiveKind::from_name(base_path(&location)),
        };

        Ok(Self {
            getter,
            location,
            subdir,
            reference,
            depth,
            ssh_key,
            checksum,
            archive,
            filename,
        })
    }

    /// Name of the file a download is written to in directory mode
    fn file_name(&self) -> String {
        if let Some(name) = &self.filename {
            return name.clone();
        }
        base_path(&self.location)
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("download")
            .to_string()
    }
}

fn invalid(source: &str, reason: &str) -> SourceError {
    SourceError::InvalidSource {
        location: source.to_string(),
        reason: reason.to_string(),
    }
}

/// Location without query string
fn base_path(location: &str) -> &str {
    location.split('?').next().unwrap_or_default()
}

/// Split `<location>//<subdir>`, ignoring the `//` of a URL scheme
fn split_subdir(base: &str) -> (String, Option<String>) {
    let offset = base.find("://").map(|idx| idx + 3).unwrap_or(0);
    match base[offset..].find("//") {
        Some(idx) => {
            let split = offset + idx;
            let subdir = base[split + 2..].trim_matches('/');
            let subdir = (!subdir.is_empty()).then(|| subdir.to_string());
            (base[..split].to_string(), subdir)
        }
        None => (base.to_string(), None),
    }
}

fn detect_getter(location: &str) -> Getter {
    let path = base_path(location);
    if path.starts_with("git@")
        || path.starts_with("ssh://")
        || path.starts_with("github.com/")
        || path.starts_with("gitlab.com/")
        || path.ends_with(".git")
    {
        Getter::Git
    } else if path.starts_with("http://") || path.starts_with("https://") {
        Getter::Http
    } else {
        Getter::File
    }
}

/// [`Fetcher`] handling local paths, HTTP(S) files and archives, and git
pub struct GetterFetcher {
    git: Arc<dyn GitClient>,
}

impl GetterFetcher {
    pub fn new(git: Arc<dyn GitClient>) -> Self {
        Self { git }
    }

    async fn fetch_file_source(&self, address: &SourceAddress, destination: &Path, mode: FetchMode) -> Result<()> {
        let path = PathBuf::from(&address.location);
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| SourceError::InvalidSource {
            location: address.location.clone(),
            reason: e.to_string(),
        })?;

        if metadata.is_dir() {
            if mode == FetchMode::File {
                return Err(invalid(&address.location, "expected a file, found a directory"));
            }
            let subdir = address.subdir.clone();
            let location = address.location.clone();
            let destination = destination.to_path_buf();
            return blocking(move || {
                let root = select_subdir(&path, subdir.as_deref(), &location)?;
                copy_dir(&root, &destination)
            })
            .await;
        }

        let data = tokio::fs::read(&path).await?;
        place_file(address, data, destination, mode).await
    }

    async fn fetch_http_source(
        &self,
        address: &SourceAddress,
        destination: &Path,
        options: &FetchOptions,
    ) -> Result<()> {
        let client = HttpClient::new(options.insecure)?;
        let data = client.get_bytes(&address.location).await?;
        place_file(address, data, destination, options.mode).await
    }

    async fn fetch_git_source(
        &self,
        address: &SourceAddress,
        destination: &Path,
        options: &FetchOptions,
    ) -> Result<()> {
        if options.mode == FetchMode::File {
            return Err(SourceError::UnsupportedSource {
                location: address.location.clone(),
                reason: "git sources can only be fetched as directories".to_string(),
            });
        }

        let key_file = match address.ssh_key.clone() {
            Some(encoded) => {
                let location = address.location.clone();
                Some(blocking(move || write_ssh_key(&location, &encoded)).await?)
            }
            None => None,
        };

        let clone_options = CloneOptions {
            depth: address.depth,
            single_branch: address.depth.is_some(),
            insecure: options.insecure,
            ssh_key_file: key_file.as_ref().map(|f| f.path().to_path_buf()),
        };

        let checkout = tempfile::tempdir()?;
        let clone_dir = checkout.path().join("repo");
        self.git
            .clone_repo(
                &address.location,
                address.reference.as_deref(),
                &clone_dir,
                &clone_options,
            )
            .await?;

        let subdir = address.subdir.clone();
        let location = address.location.clone();
        let destination = destination.to_path_buf();
        blocking(move || {
            let root = select_subdir(&clone_dir, subdir.as_deref(), &location)?;
            if destination.exists() {
                fs::remove_dir_all(&destination)?;
            }
            copy_dir(&root, &destination)
        })
        .await
    }
}

impl Default for GetterFetcher {
    fn default() -> Self {
        Self::new(Arc::new(GitCli::default()))
    }
}

#[async_trait]
impl Fetcher for GetterFetcher {
    async fn fetch(&self, source: &str, destination: &Path, options: &FetchOptions) -> Result<()> {
        let address = SourceAddress::parse(source)?;
        tracing::debug!(
            getter = ?address.getter,
            location = %address.location,
            subdir = ?address.subdir,
            destination = %destination.display(),
            "fetching source"
        );

        match address.getter {
            Getter::File => {
                self.fetch_file_source(&address, destination, options.mode)
                    .await
            }
            Getter::Http => self.fetch_http_source(&address, destination, options).await,
            Getter::Git => self.fetch_git_source(&address, destination, options).await,
        }
    }
}

/// Verify and write fetched bytes, unpacking archives unless a file is wanted
async fn place_file(address: &SourceAddress, data: Vec<u8>, destination: &Path, mode: FetchMode) -> Result<()> {
    let address = address.clone();
    let destination = destination.to_path_buf();
    blocking(move || {
        if let Some(expected) = &address.checksum {
            verify_checksum(&address.location, expected, &data)?;
        }

        match (address.archive, mode) {
            (Some(kind), FetchMode::Any | FetchMode::Dir) => {
                let unpacked = tempfile::tempdir()?;
                extract_archive(kind, &data, unpacked.path())?;
                let root = select_subdir(unpacked.path(), address.subdir.as_deref(), &address.location)?;
                copy_dir(&root, &destination)
            }
            (None, FetchMode::Dir) => Err(invalid(
                &address.location,
                "expected a directory or archive, found a file",
            )),
            (_, FetchMode::File) => {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&destination, data)?;
                Ok(())
            }
            (None, FetchMode::Any) => {
                fs::create_dir_all(&destination)?;
                fs::write(destination.join(address.file_name()), data)?;
                Ok(())
            }
        }
    })
    .await
}

/// Run filesystem and archive work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SourceError::Io(std::io::Error::other(e)))?
}

fn verify_checksum(location: &str, expected: &str, data: &[u8]) -> Result<()> {
    if let Some((kind, _)) = expected.split_once(':') {
        if !kind.eq_ignore_ascii_case("sha256") {
            return Err(SourceError::UnsupportedSource {
                location: location.to_string(),
                reason: format!("unsupported checksum type '{}'", kind),
            });
        }
    }

    let actual = compute_digest(data);
    if !digest_matches(expected, &actual) {
        return Err(SourceError::IntegrityCheckFailed {
            location: location.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn write_ssh_key(location: &str, encoded: &str) -> Result<tempfile::NamedTempFile> {
    let key = BASE64
        .decode(encoded.trim())
        .map_err(|e| invalid(location, &format!("sshkey is not valid base64: {}", e)))?;

    let mut file = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut file, &key)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600))?;
    }

    Ok(file)
}

fn extract_archive(kind: ArchiveKind, data: &[u8], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    match kind {
        ArchiveKind::TarGz => tar::Archive::new(GzDecoder::new(Cursor::new(data))).unpack(dest)?,
        ArchiveKind::Tar => tar::Archive::new(Cursor::new(data)).unpack(dest)?,
    }
    Ok(())
}

fn select_subdir(root: &Path, subdir: Option<&str>, location: &str) -> Result<PathBuf> {
    let Some(subdir) = subdir else {
        return Ok(root.to_path_buf());
    };
    let path = root.join(subdir);
    if !path.is_dir() {
        return Err(SourceError::SubdirNotFound {
            location: location.to_string(),
            subdir: subdir.to_string(),
        });
    }
    Ok(path)
}

/// Recursively copy `src` into `dst`, skipping `.git`
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SourceError::Serialization(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGitClient;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart_tarball() -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in [
            ("bundle/nginx/Chart.yaml", "name: nginx\n"),
            ("bundle/redis/Chart.yaml", "name: redis\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_parse_forced_git_with_subdir_and_ref() {
        let address =
            SourceAddress::parse("git::https://github.com/org/repo.git//charts/app?ref=v1.0.0&depth=1")
                .unwrap();
        assert_eq!(address.getter, Getter::Git);
        assert_eq!(address.location, "https://github.com/org/repo.git");
        assert_eq!(address.subdir.as_deref(), Some("charts/app"));
        assert_eq!(address.reference.as_deref(), Some("v1.0.0"));
        assert_eq!(address.depth, Some(1));
        assert_eq!(address.archive, None);
    }

    #[test]
    fn test_parse_detects_getters() {
        let git = SourceAddress::parse("github.com/org/repo//chart").unwrap();
        assert_eq!(git.getter, Getter::Git);
        assert_eq!(git.location, "https://github.com/org/repo");

        let ssh = SourceAddress::parse("git@github.com:org/repo.git").unwrap();
        assert_eq!(ssh.getter, Getter::Git);

        let http = SourceAddress::parse("https://example.com/nginx-1.0.0.tgz").unwrap();
        assert_eq!(http.getter, Getter::Http);
        assert_eq!(http.archive, Some(ArchiveKind::TarGz));

        let local = SourceAddress::parse("file::./charts/app").unwrap();
        assert_eq!(local.getter, Getter::File);
        assert_eq!(local.location, "./charts/app");
    }

    #[test]
    fn test_parse_keeps_unknown_query_parameters() {
        let address =
            SourceAddress::parse("https://example.com/values.yaml?token=abc&checksum=sha256:00").unwrap();
        assert_eq!(address.location, "https://example.com/values.yaml?token=abc");
        assert_eq!(address.checksum.as_deref(), Some("sha256:00"));
    }

    #[test]
    fn test_parse_archive_option() {
        let disabled = SourceAddress::parse("https://example.com/chart.tgz?archive=false").unwrap();
        assert_eq!(disabled.archive, None);

        let forced = SourceAddress::parse("https://example.com/download?archive=tar").unwrap();
        assert_eq!(forced.archive, Some(ArchiveKind::Tar));
    }

    #[test]
    fn test_parse_unsupported_getters() {
        for source in ["s3::https://bucket/chart.tgz", "gcs::https://bucket/x", "hg::https://x/y"] {
            let err = SourceAddress::parse(source).unwrap_err();
            assert!(matches!(err, SourceError::UnsupportedSource { .. }), "{}", source);
        }
    }

    #[tokio::test]
    async fn test_fetch_local_directory_with_subdir() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("charts/app/templates")).unwrap();
        fs::write(src.path().join("charts/app/Chart.yaml"), "name: app\n").unwrap();
        fs::write(src.path().join("charts/app/templates/cm.yaml"), "kind: ConfigMap\n").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("out");
        let source = format!("file::{}//charts/app", src.path().display());

        GetterFetcher::new(Arc::new(MockGitClient::new()))
            .fetch(&source, &target, &FetchOptions::new(FetchMode::Dir, false))
            .await
            .unwrap();

        assert!(target.join("Chart.yaml").is_file());
        assert!(target.join("templates/cm.yaml").is_file());
    }

    #[tokio::test]
    async fn test_fetch_missing_subdir() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let source = format!("{}//nope", src.path().display());

        let err = GetterFetcher::default()
            .fetch(&source, &dest.path().join("out"), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::SubdirNotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_http_archive_with_subdir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bundle.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(chart_tarball()))
            .mount(&server)
            .await;

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("chart");
        let source = format!("{}/bundle.tgz//bundle/nginx", server.uri());

        GetterFetcher::default()
            .fetch(&source, &target, &FetchOptions::new(FetchMode::Dir, false))
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(target.join("Chart.yaml")).unwrap(), "name: nginx\n");
        assert!(!target.join("bundle").exists());
    }

    #[tokio::test]
    async fn test_concurrent_archive_fetches_share_the_runtime() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bundle.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(chart_tarball()))
            .mount(&server)
            .await;

        let dest = tempfile::tempdir().unwrap();
        let nginx = dest.path().join("nginx");
        let redis = dest.path().join("redis");
        let fetcher = GetterFetcher::default();
        let options = FetchOptions::new(FetchMode::Dir, false);
        let nginx_source = format!("{}/bundle.tgz//bundle/nginx", server.uri());
        let redis_source = format!("{}/bundle.tgz//bundle/redis", server.uri());

        let (a, b) = tokio::join!(
            fetcher.fetch(&nginx_source, &nginx, &options),
            fetcher.fetch(&redis_source, &redis, &options),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(fs::read_to_string(nginx.join("Chart.yaml")).unwrap(), "name: nginx\n");
        assert_eq!(fs::read_to_string(redis.join("Chart.yaml")).unwrap(), "name: redis\n");
    }

    #[tokio::test]
    async fn test_fetch_http_file_with_checksum() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/values.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("values.yaml");
        let good = format!(
            "{}/values.yaml?checksum=sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            server.uri()
        );
        GetterFetcher::default()
            .fetch(&good, &target, &FetchOptions::new(FetchMode::File, false))
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello world");

        let bad = format!("{}/values.yaml?checksum=sha256:deadbeef", server.uri());
        let err = GetterFetcher::default()
            .fetch(&bad, &target, &FetchOptions::new(FetchMode::File, false))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::IntegrityCheckFailed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_git_passes_reference_and_subdir() {
        let git = Arc::new(MockGitClient::new().with_files(&[("charts/app/Chart.yaml", "name: app\n")]));
        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("chart");

        GetterFetcher::new(git.clone())
            .fetch(
                "git::https://example.com/repo.git//charts/app?ref=main",
                &target,
                &FetchOptions::new(FetchMode::Dir, false),
            )
            .await
            .unwrap();

        let calls = git.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://example.com/repo.git");
        assert_eq!(calls[0].reference.as_deref(), Some("main"));
        assert!(target.join("Chart.yaml").is_file());
    }

    #[tokio::test]
    async fn test_fetch_git_as_file_is_unsupported() {
        let dest = tempfile::tempdir().unwrap();
        let err = GetterFetcher::new(Arc::new(MockGitClient::new()))
            .fetch(
                "git::https://example.com/repo.git",
                &dest.path().join("values.yaml"),
                &FetchOptions::new(FetchMode::File, false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedSource { .. }));
    }
}
