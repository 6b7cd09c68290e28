// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document file commands.

use anyhow::{Context, Result};
use nodeclip_engine::{DataValue, Document, SerializedObject};
use std::path::Path;

fn load(path: &Path) -> Result<Document> {
    Document::from_file(path).with_context(|| format!("reading {}", path.display()))
}

/// Print a document summary to stdout
pub fn inspect(path: &Path) -> Result<()> {
    let document = load(path)?;
    print!("{}", summary(&document));
    Ok(())
}

/// Summary shown by `inspect`
pub fn summary(document: &Document) -> String {
    let mut lines = vec![
        format!("host version:   {}", document.host_version),
        format!("format version: {}", document.format_version),
    ];
    if let Some(name) = &document.subject_name {
        lines.push(format!("container:      {name}"));
    }
    lines.push(format!("objects:        {}", document.object_count()));

    lines.push(format!("trees ({}):", document.trees.len()));
    let last = document.trees.len().saturating_sub(1);
    lines.extend(document.trees.iter().enumerate().map(|(index, tree)| {
        format!(
            "  #{:<4} {} [{}] {} nodes, {} links{}",
            tree.identity,
            tree.str("name").unwrap_or("?"),
            tree.str("type_tag").unwrap_or("?"),
            count(tree, "nodes"),
            count(tree, "links"),
            if index == last { " (subject)" } else { "" },
        )
    }));

    lines.push(format!("external ({}):", document.external.len()));
    lines.extend(document.external.iter().map(|(id, entry)| {
        let description = entry.description.as_deref().unwrap_or("<cleared on import>");
        format!("  #{id:<4} {} - {description}", entry.fixed_type_name)
    }));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn count(tree: &SerializedObject, collection: &str) -> usize {
    tree.get(collection)
        .and_then(DataValue::as_object)
        .and_then(SerializedObject::items)
        .map_or(0, <[_]>::len)
}

/// Re-encode a document file
pub fn convert(input: &Path, output: &Path, compress: bool, indent: usize) -> Result<()> {
    let document = load(input)?;
    document
        .to_file(output, compress, indent)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(
        "Wrote {} ({})",
        output.display(),
        if compress { "compressed" } else { "plain JSON" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeclip_engine::MAGIC_PREFIX;

    fn sample() -> Document {
        crate::demo::copy_sample(&Default::default()).unwrap()
    }

    #[test]
    fn test_convert_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.json");
        let packed = dir.path().join("packed.txt");
        sample().to_file(&plain, false, 2).unwrap();

        convert(&plain, &packed, true, 0).unwrap();
        let text = std::fs::read_to_string(&packed).unwrap();
        assert!(text.starts_with(MAGIC_PREFIX));

        let back = dir.path().join("back.json");
        convert(&packed, &back, false, 2).unwrap();
        assert_eq!(Document::from_file(&back).unwrap(), Document::from_file(&plain).unwrap());
    }

    #[test]
    fn test_summary_lists_trees_and_externals() {
        let text = summary(&sample());
        let subject = text.lines().find(|l| l.ends_with("(subject)")).unwrap();
        assert!(subject.contains("Scatter"), "{text}");
        assert!(text.contains("Object - object 'Target'"), "{text}");
    }

    #[test]
    fn test_summary_of_empty_document() {
        let document = Document {
            host_version: "4.5.0".to_owned(),
            format_version: "0.1.0".to_owned(),
            subject_name: None,
            trees: Vec::new(),
            external: Default::default(),
        };
        let text = summary(&document);
        assert!(text.ends_with("external (0):\n"), "{text}");
        assert!(text.contains("trees (0):"), "{text}");
        assert!(!text.contains("(subject)"), "{text}");
    }
}
