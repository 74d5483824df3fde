use std::error::Error;

mod common;

const SRC: &str = "limit := 100

func main
    ret limit
end";

#[test]
fn compile_global_constant_inlined() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("ret i64 100"));
    Ok(())
}
