use std::error::Error;

mod common;

const SRC: &str = "func main
    x := 10u / 3u
    y := 10u >> 1u
    ret 0
end";

#[test]
fn compile_unsigned_arithmetic() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("udiv i64"));
    assert!(ir.contains("lshr i64"));
    Ok(())
}
