pub mod smoke;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use std::sync::Arc;

            use $crate::smoke;

            macro_rules! smoke_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        let backend = Arc::new(($backend_ctor)());
                        smoke::$name(&backend);
                    }
                };
            }

            smoke_test!(pooling_output_shape);
            smoke_test!(max_pooling_matches_expected);
            smoke_test!(average_pooling_same_padding_excludes_padding);
            smoke_test!(quantized_pooling_stays_within_one_step);
            smoke_test!(fused_relu_clamps_negative_outputs);
            smoke_test!(sync_and_async_agree);
            smoke_test!(concurrent_async_matches_sequential);
        }
    };
}
