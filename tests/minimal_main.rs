use std::error::Error;

mod common;

const SRC: &str = "func main; ret 0; end";

#[test]
fn compile_minimal_main() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("define i64 @\"main\"()"));
    assert!(ir.contains("ret i64 0"));
    Ok(())
}
