use crate::builder::ProgramBuilder;
use crate::op::Program;

/// The classic "Hello World!" program in text form.
pub const HELLO_WORLD: &str = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";

/// `HELLO_WORLD`, built directly as an operation tree.
///
/// Cell 0 counts eight outer iterations and the inner loop builds the
/// character bases in cells 2-5. `[<]` finds the way back to cell 1, which
/// the inner loop has just cleared.
pub fn hello_world() -> Program {
    ProgramBuilder::new()
        .inc(8)
        .while_nonzero(|b| {
            b.right(1)
                .inc(4)
                .while_nonzero(|b| {
                    b.right(1)
                        .inc(2)
                        .right(1)
                        .inc(3)
                        .right(1)
                        .inc(3)
                        .right(1)
                        .inc(1)
                        .left(4)
                        .dec(1)
                })
                .right(1)
                .inc(1)
                .right(1)
                .inc(1)
                .right(1)
                .dec(1)
                .right(2)
                .inc(1)
                .while_nonzero(|b| b.left(1))
                .left(1)
                .dec(1)
        })
        .group(|b| {
            b.right(2)
                .output()
                .right(1)
                .dec(3)
                .output()
                .inc(7)
                .output()
                .output()
                .inc(3)
                .output()
        })
        .group(|b| {
            b.right(2)
                .output()
                .left(1)
                .dec(1)
                .output()
                .left(1)
                .output()
                .inc(3)
                .output()
                .dec(6)
                .output()
                .dec(8)
                .output()
        })
        .group(|b| b.right(2).inc(1).output().right(1).inc(2).output())
        .build()
}
