use std::error::Error;

mod common;

const SRC: &str = "func main
    x := 1 as float
    ret 0
end";

#[test]
fn compile_builtin_cast() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("sitofp i64 1 to double"));
    Ok(())
}
