use tessel_rs_backend_ref_cpu::RefBackend;

tessel_rs_backend_tests::define_backend_tests!(ref_cpu_fused, RefBackend::new);
tessel_rs_backend_tests::define_backend_tests!(ref_cpu_unfused, RefBackend::without_fusion);
