//! Algebraic properties of `VfsPath`.

use muxfs_core::VfsPath;
use quickcheck::quickcheck;

quickcheck! {
    fn normalization_is_idempotent(raw: String) -> bool {
        let once = VfsPath::normalize(&raw);
        VfsPath::normalize(once.as_str()) == once
    }

    fn empty_is_append_identity(raw: String) -> bool {
        let path = VfsPath::normalize(&raw);
        path.append(&VfsPath::empty()) == path && VfsPath::empty().append(&path) == path
    }

    fn up_never_leaves_root(raw: String) -> bool {
        let path = VfsPath::root().join(&raw);
        path.up().is_absolute()
    }
}

#[test]
fn up_boundaries() {
    assert!(VfsPath::root().up().is_root());
    assert!(VfsPath::from("/a").up().is_root());
    assert!(VfsPath::from("a").up().is_empty());
}

#[test]
fn append_identity_at_root_and_empty() {
    let empty = VfsPath::empty();
    let root = VfsPath::root();
    assert_eq!(empty.append(&root), root);
    assert_eq!(empty.append(&empty), empty);
    assert_eq!(root.append(&empty), root);
}
