//! Shared test infrastructure for integration tests.
//!
//! Fixtures are small POSIX shell scripts standing in for third-party
//! binaries; every test skips cleanly when the host has no `/bin/sh`.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Fixture CLI with a two-level help-advertised command tree:
/// `scan`, `scan deep`, and `export`.
pub const ACME_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "--help" ] || [ "$1" = "-h" ] || [ "$1" = "help" ]; then
  cat <<'EOF'
Usage: acme <command> [flags]

Commands:
  scan    Scan a target
  export  Export results

Flags:
  --verbose  Verbose output
EOF
  exit 0
fi
if [ "$1" = "scan" ]; then
  if [ "$2" = "--help" ] || [ "$2" = "-h" ] || [ "$2" = "help" ]; then
    cat <<'EOF'
Usage: acme scan <subcommand> [flags]

Commands:
  deep    Exhaustive scan
EOF
    exit 0
  fi
  if [ "$2" = "deep" ]; then
    if [ "$3" = "--help" ] || [ "$3" = "-h" ] || [ "$3" = "help" ]; then
      cat <<'EOF'
Usage: acme scan deep [flags]

Flags:
  --all   Scan everything
EOF
      exit 0
    fi
  fi
fi
if [ "$1" = "export" ]; then
  if [ "$2" = "--help" ] || [ "$2" = "-h" ] || [ "$2" = "help" ]; then
    cat <<'EOF'
Usage: acme export [flags]

Flags:
  --format FORMAT  Output format
EOF
    exit 0
  fi
fi
exit 0
"#;

/// Fixture CLI that creates files under `$HOME` and the working directory
/// when invoked as `touch` with no further arguments (used by the policy
/// tests).
#[allow(dead_code)]
pub const WRITER_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "--help" ] || [ "$1" = "-h" ] || [ "$1" = "help" ]; then
  cat <<'EOF'
Usage: writer <command>

Commands:
  touch   Create marker files
EOF
  exit 0
fi
if [ "$1" = "touch" ] && [ -z "$2" ]; then
  mkdir -p "$HOME/.ssh"
  echo secret > "$HOME/.ssh/id_test"
  echo out > out.txt
  exit 0
fi
exit 0
"#;

/// Fixture CLI that hangs long enough to trip any short supervision timeout
/// (used by the policy tests).
#[allow(dead_code)]
pub const SLEEPER_SCRIPT: &str = "#!/bin/sh\nsleep 30\n";

pub fn sh_available() -> bool {
    Path::new("/bin/sh").is_file()
}

pub fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).expect("write script");
    let mut perms = std::fs::metadata(path)
        .expect("script metadata")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).expect("set script permissions");
}
