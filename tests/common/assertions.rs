//! Custom assertions for VFS contents

use input_vfs::Vfs;

/// Assert the VFS entry names, in order
pub fn assert_names(vfs: &Vfs, expected: &[&str]) {
    let names: Vec<&str> = vfs.names().collect();
    assert_eq!(names, expected, "unexpected VFS entries");
}

/// Assert the full content of one entry
pub fn assert_content(vfs: &Vfs, name: &str, expected: &[u8]) {
    let content = vfs
        .read(name)
        .unwrap_or_else(|e| panic!("failed to read {name}: {e}"));
    assert_eq!(
        content,
        expected,
        "unexpected content for {name}: {:?}",
        String::from_utf8_lossy(&content)
    );
}
