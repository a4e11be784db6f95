//! Fixture builders shared by the unit tests.
//!
//! Archives are written at test time with `zip::ZipWriter` so no binary
//! fixtures live in the tree. The layout mirrors a client data directory:
//!
//! ```text
//! data/test/
//! ├── test.txt              "test line 1\ntest line 2"
//! ├── units.xml
//! ├── dir1/file1.txt
//! ├── dir2/{file1.txt, file2.txt, test.txt}
//! ├── test.zip              dir/hide.png (deflated), dir/brimmedhat.png (stored)
//! ├── test2.zip             11 entries, see `TEST2_ENTRIES`
//! └── test3.zip             test.txt, units.xml
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const TEST_TXT: &[u8] = b"test line 1\ntest line 2";
pub(crate) const UNITS_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<units>\n    <unit id=\"1\" name=\"test\"/>\n    <unit id=\"2\" name=\"test2\"/>\n</units>\n";
pub(crate) const PATHS_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<paths>\n    <option name=\"itemIcons\" value=\"graphics/items/\"/>\n</paths>\n";

/// One entry to write into a fixture archive.
pub(crate) enum ZipItem<'a> {
    Stored(&'a str, &'a [u8]),
    Deflated(&'a str, &'a [u8]),
    Dir(&'a str),
}

/// Deterministic binary payload standing in for image data.
pub(crate) fn png_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(method)
}

pub(crate) fn write_zip(path: &Path, items: &[ZipItem<'_>]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for item in items {
        match item {
            ZipItem::Stored(name, data) => {
                zip.start_file(*name, options(CompressionMethod::Stored)).unwrap();
                zip.write_all(data).unwrap();
            }
            ZipItem::Deflated(name, data) => {
                zip.start_file(*name, options(CompressionMethod::Deflated)).unwrap();
                zip.write_all(data).unwrap();
            }
            ZipItem::Dir(name) => {
                zip.add_directory(*name, options(CompressionMethod::Stored)).unwrap();
            }
        }
    }
    zip.finish().unwrap();
}

/// Names in `test2.zip`, in archive order.
pub(crate) const TEST2_ENTRIES: [&str; 11] = [
    "test.txt",
    "dir2/hide.png",
    "dir2/test.txt",
    "dir2/paths.xml",
    "dir2/units.xml",
    "dir/hide.png",
    "dir/1/test.txt",
    "dir/1/file1.txt",
    "dir/gpl/palette.gpl",
    "dir/dye.png",
    "units.xml",
];

/// A scratch tree with the layout described in the module docs.
pub(crate) struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("data").join("test");
        fs::create_dir_all(root.join("dir1")).unwrap();
        fs::create_dir_all(root.join("dir2")).unwrap();
        fs::write(root.join("test.txt"), TEST_TXT).unwrap();
        fs::write(root.join("units.xml"), UNITS_XML).unwrap();
        fs::write(root.join("dir1").join("file1.txt"), TEST_TXT).unwrap();
        fs::write(root.join("dir2").join("file1.txt"), TEST_TXT).unwrap();
        fs::write(root.join("dir2").join("file2.txt"), TEST_TXT).unwrap();
        fs::write(root.join("dir2").join("test.txt"), b"plain directory copy").unwrap();

        let hide = png_bytes(368, 7);
        let hat = png_bytes(1959, 3);
        let dye = png_bytes(794, 11);
        write_zip(
            &root.join("test.zip"),
            &[
                ZipItem::Dir("dir/"),
                ZipItem::Deflated("dir/hide.png", &hide),
                ZipItem::Stored("dir/brimmedhat.png", &hat),
            ],
        );
        write_zip(
            &root.join("test2.zip"),
            &[
                ZipItem::Deflated("test.txt", TEST_TXT),
                ZipItem::Deflated("dir2/hide.png", &hide),
                ZipItem::Deflated("dir2/test.txt", TEST_TXT),
                ZipItem::Deflated("dir2/paths.xml", PATHS_XML),
                ZipItem::Deflated("dir2/units.xml", UNITS_XML),
                ZipItem::Deflated("dir/hide.png", &hide),
                ZipItem::Deflated("dir/1/test.txt", TEST_TXT),
                ZipItem::Deflated("dir/1/file1.txt", TEST_TXT),
                ZipItem::Deflated("dir/gpl/palette.gpl", b"GIMP Palette\nName: test\n#\n  0   0   0\tBlack\n255 255 255\tWhite\n"),
                ZipItem::Stored("dir/dye.png", &dye),
                ZipItem::Deflated("units.xml", UNITS_XML),
            ],
        );
        write_zip(
            &root.join("test3.zip"),
            &[
                ZipItem::Deflated("test.txt", TEST_TXT),
                ZipItem::Deflated("units.xml", UNITS_XML),
            ],
        );

        Self { _tmp: tmp, root }
    }

    /// `…/data/test`
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Same as [`path`](Self::path) but as a string, the way mount calls take it.
    pub(crate) fn str(&self, rel: &str) -> String {
        self.path(rel).to_string_lossy().into_owned()
    }
}

/// Sorted copy of a listing, for order-independent comparisons.
pub(crate) fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}
