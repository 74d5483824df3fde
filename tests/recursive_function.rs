use std::error::Error;

mod common;

const SRC: &str = "func fib(n): int
    ret if n <= 1 then 1 else fib(n - 1) + fib(n - 2) end
end

func main
    ret fib(10)
end";

#[test]
fn compile_recursive_function_with_annotation() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    assert!(ir.contains("define i64 @\"fib."));
    assert!(ir.contains("call i64 @\"fib."));
    Ok(())
}
