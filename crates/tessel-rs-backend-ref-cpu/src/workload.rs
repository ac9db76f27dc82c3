use tessel_rs::backend::BackendId;
use tessel_rs::error::{EngineError, EngineResult};
use tessel_rs::layers::{ActivationDescriptor, LayerDescriptor, UnaryOperation};
use tessel_rs::tensor::codec;
use tessel_rs::tensor::shape_helpers::{spatial_dims_or_error, SpatialDims};
use tessel_rs::tensor::{TensorHandle, TensorInfo, TensorView, TensorViewMut};
use tessel_rs::workload::{Workload, WorkingMemory, WorkloadInfo, WorkloadRequest};

use crate::kernels::{
    op_activation, op_convolution2d, op_elementwise_unary, op_l2_normalization, op_pooling2d,
    ConvolutionParams, PoolingParams,
};

enum Kernel {
    Pooling2d {
        input: SpatialDims,
        output: SpatialDims,
        params: PoolingParams,
    },
    Convolution2d {
        input: SpatialDims,
        output: SpatialDims,
        params: ConvolutionParams,
    },
    Activation(ActivationDescriptor),
    L2Normalization {
        dims: SpatialDims,
        eps: f32,
    },
    ElementwiseUnary(UnaryOperation),
}

fn spatial(info: &TensorInfo) -> Result<SpatialDims, String> {
    spatial_dims_or_error(info, |reason| reason)
}

impl Kernel {
    fn build(descriptor: &LayerDescriptor, info: &WorkloadInfo) -> Result<Self, String> {
        let input = &info.inputs[0];
        let output = &info.outputs[0];
        match descriptor {
            LayerDescriptor::Pooling2d(desc) => {
                let input = spatial(input)?;
                let padding = desc
                    .window()
                    .resolve_padding(desc.padding, input.height, input.width)
                    .map_err(|err| err.to_string())?;
                Ok(Kernel::Pooling2d {
                    input,
                    output: spatial(output)?,
                    params: PoolingParams {
                        algorithm: desc.algorithm,
                        pool_height: desc.pool_height,
                        pool_width: desc.pool_width,
                        stride_y: desc.stride_y,
                        stride_x: desc.stride_x,
                        padding,
                        padding_method: desc.padding_method,
                    },
                })
            }
            LayerDescriptor::Convolution2d(desc) => {
                let input = spatial(input)?;
                let filter = desc.filter_dims()?;
                let padding = desc
                    .window()?
                    .resolve_padding(desc.padding, input.height, input.width)
                    .map_err(|err| err.to_string())?;
                // constants are decoded once so both entry points share them read-only
                let weights = desc
                    .weights
                    .to_f32_vec()
                    .map_err(|err| format!("weights: {err}"))?;
                let bias = desc
                    .bias
                    .as_ref()
                    .map(|bias| bias.to_f32_vec())
                    .transpose()
                    .map_err(|err| format!("bias: {err}"))?;
                Ok(Kernel::Convolution2d {
                    input,
                    output: spatial(output)?,
                    params: ConvolutionParams {
                        filter,
                        stride_y: desc.stride_y,
                        stride_x: desc.stride_x,
                        dilation_y: desc.dilation_y,
                        dilation_x: desc.dilation_x,
                        padding,
                        weights,
                        bias,
                    },
                })
            }
            LayerDescriptor::Activation(desc) => Ok(Kernel::Activation(*desc)),
            LayerDescriptor::L2Normalization(desc) => Ok(Kernel::L2Normalization {
                dims: spatial(input)?,
                eps: desc.eps,
            }),
            LayerDescriptor::ElementwiseUnary(desc) => Ok(Kernel::ElementwiseUnary(desc.operation)),
            LayerDescriptor::Input(_) | LayerDescriptor::Output(_) => {
                Err("network bindings have no workload".to_string())
            }
        }
    }

    fn run(&self, input: &[f32], output: &mut [f32]) {
        match self {
            Kernel::Pooling2d {
                input: in_dims,
                output: out_dims,
                params,
            } => op_pooling2d(in_dims, out_dims, params, input, output),
            Kernel::Convolution2d {
                input: in_dims,
                output: out_dims,
                params,
            } => op_convolution2d(in_dims, out_dims, params, input, output),
            Kernel::Activation(desc) => op_activation(desc, input, output),
            Kernel::L2Normalization { dims, eps } => op_l2_normalization(dims, *eps, input, output),
            Kernel::ElementwiseUnary(operation) => op_elementwise_unary(*operation, input, output),
        }
    }
}

/// Immutable part of a workload, shared by both entry points.
struct Plan {
    info: WorkloadInfo,
    kernel: Kernel,
    fused_activation: Option<ActivationDescriptor>,
    input_elements: usize,
    output_elements: usize,
}

impl Plan {
    fn scratch_elements(&self) -> usize {
        self.input_elements + self.output_elements
    }

    /// Decodes `input` into the front of `scratch`, computes into the back, encodes into `output`.
    fn run(&self, scratch: &mut [f32], input: &[u8], output: &mut [u8]) -> Result<(), String> {
        let (src, rest) = scratch.split_at_mut(self.input_elements);
        let dst = &mut rest[..self.output_elements];
        codec::decode_to_f32(&self.info.inputs[0], input, src).map_err(|err| err.to_string())?;
        self.kernel.run(src, dst);
        if let Some(activation) = &self.fused_activation {
            activation.apply_in_place(dst);
        }
        codec::encode_from_f32(&self.info.outputs[0], dst, output).map_err(|err| err.to_string())
    }
}

/// Workload of the reference backend: one host kernel per layer, computed in `f32`.
pub struct RefWorkload {
    name: String,
    backend: BackendId,
    plan: Plan,
    inputs: Vec<TensorHandle>,
    outputs: Vec<TensorHandle>,
    // scratch of the synchronous path; async callers bring their own
    scratch: WorkingMemory,
}

impl RefWorkload {
    pub fn new(backend: BackendId, request: WorkloadRequest<'_>) -> EngineResult<Self> {
        let kind = request.descriptor.kind();
        let failure = |reason: String| {
            EngineError::construction(format!(
                "{kind} workload '{}' on {backend}: {reason}",
                request.name
            ))
        };
        if request.info.inputs.len() != 1 || request.info.outputs.len() != 1 {
            return Err(failure(format!(
                "expected one input and one output, got {} and {}",
                request.info.inputs.len(),
                request.info.outputs.len()
            )));
        }
        if request.inputs.len() != 1 || request.outputs.len() != 1 {
            return Err(failure("tensor handles do not match the workload info".to_string()));
        }
        // kernels index by the output dims, so they must be exactly what the layer produces
        request
            .descriptor
            .validate()
            .and_then(|()| {
                request
                    .descriptor
                    .check_output_infos(&request.info.inputs, &request.info.outputs)
            })
            .map_err(|err| failure(err.to_string()))?;
        let kernel = Kernel::build(request.descriptor, &request.info).map_err(failure)?;
        let element_count = |info: &TensorInfo| {
            info.num_elements()
                .ok_or_else(|| failure(format!("{info} is not static")))
        };
        let input_elements = element_count(&request.info.inputs[0])?;
        let output_elements = element_count(&request.info.outputs[0])?;

        tracing::trace!(
            layer = %request.layer,
            %kind,
            fused = request.fused_activation.is_some(),
            "created reference workload"
        );
        let plan = Plan {
            info: request.info,
            kernel,
            fused_activation: request.fused_activation,
            input_elements,
            output_elements,
        };
        let scratch = WorkingMemory::new(plan.scratch_elements());
        Ok(Self {
            name: request.name.to_string(),
            backend,
            plan,
            inputs: request.inputs,
            outputs: request.outputs,
            scratch,
        })
    }

    fn execution_error(&self, message: String) -> EngineError {
        EngineError::execution(&self.backend, &self.name, message)
    }
}

impl Workload for RefWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &BackendId {
        &self.backend
    }

    fn info(&self) -> &WorkloadInfo {
        &self.plan.info
    }

    fn execute(&mut self) -> EngineResult<()> {
        let input = self.inputs[0].read();
        let mut output = self.outputs[0].write();
        let scratch = self.scratch.scratch(self.plan.scratch_elements());
        let result = self.plan.run(scratch, &input, &mut output);
        drop(output);
        drop(input);
        result.map_err(|message| self.execution_error(message))
    }

    fn execute_async(
        &self,
        memory: &mut WorkingMemory,
        inputs: &[TensorView<'_>],
        outputs: &mut [TensorViewMut<'_>],
    ) -> EngineResult<()> {
        self.plan
            .info
            .check_views(inputs, outputs)
            .map_err(|message| self.execution_error(message))?;
        let scratch = memory.scratch(self.plan.scratch_elements());
        self.plan
            .run(scratch, inputs[0].bytes, &mut *outputs[0].bytes)
            .map_err(|message| self.execution_error(message))
    }

    fn working_memory_size(&self) -> usize {
        self.plan.scratch_elements()
    }
}
