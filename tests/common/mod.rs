//! Shared fixtures: recording tool stubs, fixture tarballs and settings files.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vendor_builder::hash::sha256_file;

/// A scratch project: settings root, stub tools and served downloads.
pub struct Project {
    pub temp: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let project = Self {
            temp: TempDir::new().unwrap(),
        };
        fs::create_dir_all(project.tools_dir()).unwrap();
        fs::create_dir_all(project.served_dir()).unwrap();
        project
    }

    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.temp.path()).unwrap()
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.temp.path().join("tools")
    }

    /// Files the stub `curl` can "download", looked up by URL file name.
    pub fn served_dir(&self) -> PathBuf {
        self.temp.path().join("served")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.temp.path().join("downloads")
    }

    pub fn log_path(&self) -> PathBuf {
        self.temp.path().join("tools.log")
    }

    /// Every recorded tool invocation, one per line.
    pub fn log(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect()
    }

    pub fn calls(&self, tool: &str) -> Vec<String> {
        let prefix = format!("{tool} ");
        self.log()
            .into_iter()
            .filter(|line| line.starts_with(&prefix) || line == tool)
            .collect()
    }

    /// Canned `otool -L` listings, looked up by binary file name.
    pub fn otool_dir(&self) -> PathBuf {
        self.temp.path().join("otool")
    }

    /// Make the stub `otool -L` list `libs` for any binary named `binary`.
    pub fn report_links(&self, binary: &Path, libs: &[String]) {
        fs::create_dir_all(self.otool_dir()).unwrap();
        let mut listing = format!("{}:\n", binary.display());
        for lib in libs {
            listing.push_str(&format!(
                "\t{lib} (compatibility version 1.1.0, current version 1.1.0)\n"
            ));
        }
        let name = binary.file_name().unwrap();
        fs::write(self.otool_dir().join(name), listing).unwrap();
    }

    /// Write an executable stub that logs `<name> <args>` and then runs `body`.
    pub fn stub(&self, name: &str, body: &str) -> PathBuf {
        let path = self.tools_dir().join(name);
        write_script(
            &path,
            &format!(
                "#!/bin/sh\necho \"{name} $*\" >> '{}'\n{body}\n",
                self.log_path().display()
            ),
        );
        path
    }

    /// Install stubs for every tool and return matching settings lines.
    pub fn install_stubs(&self) -> String {
        let served = self.served_dir();
        let curl = self.stub(
            "curl",
            &format!(
                r#"url=""; out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --url) url="$2"; shift ;;
    --output) out="$2"; shift ;;
  esac
  shift
done
src='{}'/"$(basename "$url")"
[ -f "$src" ] || exit 22
cp "$src" "$out""#,
                served.display()
            ),
        );
        let tar = match which::which("tar") {
            Ok(real) => self.stub("tar", &format!("exec '{}' \"$@\"", real.display())),
            Err(_) => self.stub("tar", "exit 1"),
        };
        let make = self.stub("make", "exit 0");
        let install_name_tool = self.stub("install_name_tool", "exit 0");
        let otool = self.stub(
            "otool",
            &format!(
                r#"report='{}'/"$(basename "$2")"
if [ -f "$report" ]; then cat "$report"; exit 0; fi
echo "$2:"
printf '\t%s (compatibility version 1.0.0, current version 1.0.0)\n' "$2"
printf '\t/usr/local/opt/openssl/lib/libcrypto.1.1.dylib (compatibility version 1.1.0, current version 1.1.0)\n'
printf '\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1252.0.0)\n'"#,
                self.otool_dir().display()
            ),
        );
        let pkgbuild = self.stub(
            "pkgbuild",
            r#"for last in "$@"; do :; done
touch "$last""#,
        );
        let patch = self.stub(
            "patch",
            r#"if [ "$3" = "-o" ]; then cat "$1" "$2" > "$4"; fi"#,
        );
        let ed = self.stub("ed", "cat > /dev/null");
        let cc = self.stub(
            "cc",
            r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then touch "$2"; fi
  shift
done"#,
        );

        let line = |key: &str, path: &Path| format!("{key} = \"{}\"\n", path.display());
        [
            line("curl_bin", &curl),
            line("tar_bin", &tar),
            line("make_bin", &make),
            line("install_name_tool_bin", &install_name_tool),
            line("otool_bin", &otool),
            line("pkgbuild_bin", &pkgbuild),
            line("patch_bin", &patch),
            line("ed_bin", &ed),
            line("cc_bin", &cc),
            line("download_dir", &self.download_dir()),
        ]
        .concat()
    }

    /// Write `config.toml` with a `[DEFAULT]` table made of `defaults`.
    pub fn write_settings(&self, defaults: &str) -> PathBuf {
        let path = self.temp.path().join("config.toml");
        fs::write(&path, format!("[DEFAULT]\n{defaults}\n[override]\n")).unwrap();
        path
    }

    /// Put `contents` where the stub `curl` serves it as `name`, returning its SHA-256.
    pub fn serve(&self, name: &str, contents: &[u8]) -> String {
        let path = self.served_dir().join(name);
        fs::write(&path, contents).unwrap();
        sha256_file(&path).unwrap()
    }

    /// Serve a tarball built from `entries`, returning its SHA-256.
    pub fn serve_tarball(&self, name: &str, entries: &[(&str, &str, u32)]) -> String {
        let path = self.served_dir().join(name);
        write_tarball(&path, entries);
        sha256_file(&path).unwrap()
    }
}

pub fn write_script(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Uncompressed tarball of `(path, contents, mode)` entries.
pub fn write_tarball(path: &Path, entries: &[(&str, &str, u32)]) {
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(file);
    for (name, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap();
}

/// Sorted names of the entries directly inside `dir`.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|rd| {
            rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn have_real_tool(name: &str) -> bool {
    which::which(name).is_ok()
}
