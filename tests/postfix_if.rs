use std::error::Error;

mod common;

const SRC: &str = "func main
    ret 1 if true
    ret 0
end";

#[test]
fn compile_postfix_if() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("postfix.then"));
    Ok(())
}
