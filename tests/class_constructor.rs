use std::error::Error;

mod common;

const SRC: &str = "class point
    x : int, y : int

    init(x, y)
        @x = x
        @y = y
    end

    func sum
        ret @x + @y
    end
end

func main
    p := new point{1, 2}
    ret p.sum
end";

#[test]
fn compile_class_with_constructor() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    assert!(ir.contains("%class.point = type { i64, i64 }"));
    assert!(ir.contains("malloc %class.point, i64 1"));
    assert!(ir.contains("call void @\"dachs.init."));
    assert!(ir.contains("call i64 @\"sum."));
    Ok(())
}
