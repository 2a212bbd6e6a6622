//! Master index (repomd.xml) patching.

use std::{fs, path::Path};

use tracing::debug;

use crate::{
    error::{ErrorContext, ImaError},
    finalize::{Artifact, IMADATA_GZ_FILENAME},
    metadata::REPODATA_DIR,
    xml::{indent, Document, Element, Namespaces},
    ImaResult,
};

/// The repomd (default) namespace.
pub const REPO_NS: &str = "http://linux.duke.edu/metadata/repo";

/// The rpm metadata namespace, conventionally bound to the `rpm` prefix.
pub const RPM_NS: &str = "http://linux.duke.edu/metadata/rpm";

/// The `type` attribute of the data entry this tool owns.
pub const IMADATA_TYPE: &str = "imadata";

/// File name of the master index inside the metadata directory.
pub const REPOMD_FILENAME: &str = "repomd.xml";

fn text_element(tag: &str, text: &str) -> Element {
    let mut element = Element::new(tag);
    element.text = Some(text.to_string());
    element
}

fn data_entry(artifact: &Artifact) -> Element {
    let mut data = Element::new("data");
    data.set_attr("type", IMADATA_TYPE);

    let mut checksum = text_element("checksum", &artifact.checksum);
    checksum.set_attr("type", "sha256");
    data.children.push(checksum);

    let mut open_checksum = text_element("open-checksum", &artifact.open_checksum);
    open_checksum.set_attr("type", "sha256");
    data.children.push(open_checksum);

    let mut location = Element::new("location");
    location.set_attr(
        "href",
        &format!("{REPODATA_DIR}/{}_{IMADATA_GZ_FILENAME}", artifact.checksum),
    );
    data.children.push(location);

    data.children
        .push(text_element("timestamp", &artifact.timestamp.to_string()));
    data.children
        .push(text_element("size", &artifact.size.to_string()));
    data.children
        .push(text_element("open-size", &artifact.open_size.to_string()));

    data
}

/// Registers a finalized artifact in the repository's master index.
///
/// Parses `repodata/repomd.xml`, refuses to touch a document that already
/// carries a `<data type="imadata">` entry, appends the new entry with the
/// artifact's checksums, sizes, timestamp and location, and rewrites the
/// file in place. Namespace declarations and the formatting of existing
/// entries are preserved; canonical indentation is applied to the new
/// subtree only, plus the one tail adjustment that keeps the new sibling
/// aligned. The rewrite goes through a temporary file in the same
/// directory and a rename, so a crash never leaves a half-written index.
///
/// # Errors
///
/// * [`ImaError::DuplicateEntry`] if an imadata entry already exists; the
///   index is not modified in that case.
/// * [`ImaError::Xml`] if the master index cannot be parsed.
/// * [`ImaError::IoError`] for read or write failures.
pub fn register_artifact(repo_root: &Path, artifact: &Artifact) -> ImaResult<()> {
    let repomd_path = repo_root.join(REPODATA_DIR).join(REPOMD_FILENAME);
    let content = fs::read_to_string(&repomd_path)
        .with_context(|| format!("reading `{}`", repomd_path.display()))?;
    let mut doc = Document::parse(&content)?;

    let namespaces = Namespaces::from_element(&doc.root);
    for child in &doc.root.children {
        let (namespace, local) = namespaces.expand(&child.tag);
        if namespace == Some(REPO_NS)
            && local == "data"
            && child.attr("type") == Some(IMADATA_TYPE)
        {
            return Err(ImaError::DuplicateEntry { path: repomd_path });
        }
    }

    // Align the new sibling with the existing entries.
    if let Some(last) = doc.root.children.last_mut() {
        last.tail = Some("\n  ".to_string());
    }

    let mut data = data_entry(artifact);
    indent(&mut data, 1);
    doc.root.children.push(data);

    let tmp_path = repomd_path.with_extension("xml.tmp");
    fs::write(&tmp_path, doc.render())
        .with_context(|| format!("writing `{}`", tmp_path.display()))?;
    fs::rename(&tmp_path, &repomd_path)
        .with_context(|| format!("replacing `{}`", repomd_path.display()))?;
    debug!("registered {IMADATA_TYPE} entry in {}", repomd_path.display());

    Ok(())
}
