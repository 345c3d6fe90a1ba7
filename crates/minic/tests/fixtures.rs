//! Runs every program under `tests/programs/` and checks its PRINT stream.
//!
//! Each fixture declares its expectations in header comments:
//!
//! ```c
//! // input: 5 7        (optional; integers served to GET in order)
//! // expect: 12        (the exact PRINT stream, in order)
//! ```

use std::fs;
use std::path::Path;

use minic::{CollectPrint, Executor, ScriptedInput};

#[test]
fn program_fixtures() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs");
    let mut paths: Vec<_> = fs::read_dir(&dir)
        .expect("tests/programs exists")
        .map(|entry| entry.expect("readable dir entry").path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("c"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty(), "no fixtures found in {}", dir.display());

    for path in paths {
        let name = path.file_name().expect("file name").to_string_lossy().into_owned();
        let source = fs::read_to_string(&path).expect("readable fixture");
        let expected = directive_values(&source, "// expect:");
        let input = directive_values(&source, "// input:");

        let exec = Executor::new(&source, &name).unwrap_or_else(|err| panic!("{err}"));
        let mut out = CollectPrint::default();
        let mut input = ScriptedInput::new(input);
        exec.run(&mut input, &mut out)
            .unwrap_or_else(|err| panic!("{name}: {err}"));
        assert_eq!(out.values, expected, "{name} printed the wrong stream");
    }
}

fn directive_values(source: &str, directive: &str) -> Vec<i64> {
    source
        .lines()
        .filter_map(|line| line.trim().strip_prefix(directive))
        .flat_map(str::split_whitespace)
        .map(|token| {
            token
                .parse::<i64>()
                .unwrap_or_else(|_| panic!("bad directive value {token:?}"))
        })
        .collect()
}
