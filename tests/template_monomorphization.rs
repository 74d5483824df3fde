use std::error::Error;

mod common;

const SRC: &str = "func add(a, b)
    ret a + b
end

func main
    ret add(1, 2)
end";

#[test]
fn compile_template_function_monomorphized() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    // exactly one monomorphized `add` over (i64, i64)
    let definitions = ir.matches("define i64 @\"add.").count();
    assert_eq!(definitions, 1);
    assert!(ir.contains("add i64 %a, %b"));
    assert!(ir.contains("call i64 @\"add."));
    Ok(())
}
