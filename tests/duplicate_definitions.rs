use dachs::compiler::CompileError;

mod common;

const SRC: &str = "func f(x: int); ret 0; end
func f(x: int); ret 1; end
func main; ret 0; end";

#[test]
fn duplicate_definitions_fail_semantic_check() {
    let err = common::compile(SRC).unwrap_err();
    let CompileError::Semantic(err) = err else {
        panic!("expected a semantic check error, got {err}");
    };
    // both definitions are reported, each with its own location
    assert_eq!(err.count, 2);
    assert_eq!(err.phase, "function duplication check");
}
