use std::error::Error;

mod common;

const SRC: &str = "func main
    ret if true then 1 else 2 end
end";

#[test]
fn compile_if_expression_joins_with_phi() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("phi i64"));
    assert!(ir.contains("if.merge"));
    Ok(())
}
