use std::error::Error;

mod common;

const SRC: &str = "func main
    a := new [int]{4u}
    ret 0
end";

#[test]
fn compile_new_array_rewrite() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("malloc [4 x i64], i64 1"));
    Ok(())
}
