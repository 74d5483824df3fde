use dachs::compiler::CompileError;

mod common;

const SRC: &str = "func main; ret 0";

#[test]
fn parse_error_aborts_pipeline() {
    let err = common::compile(SRC).unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
}
