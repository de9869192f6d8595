use std::fs;
use std::path::Path;

fn collect_sources(dir: &Path, sources: &mut Vec<std::path::PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sources(&path, sources)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            sources.push(path);
        }
    }
    Ok(())
}

#[test]
fn license_headers_are_closed() -> Result<(), anyhow::Error> {
    let mut sources = Vec::new();
    collect_sources(&Path::new(env!("CARGO_MANIFEST_DIR")).join("src"), &mut sources)?;
    assert!(!sources.is_empty());
    for source in sources {
        let content = fs::read_to_string(&source)?;
        let header_end = content
            .lines()
            .position(|line| line == "*/")
            .ok_or_else(|| anyhow::anyhow!("{} has no closed header", source.display()))?;
        assert!(content.starts_with("/*\nMIT License"), "{}", source.display());
        assert_eq!(header_end, 22, "{}", source.display());
    }
    Ok(())
}
